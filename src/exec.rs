use crate::error::{ChangerError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

/// Captured result of one external command invocation.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// The single primitive every hardware interaction goes through: run an
/// external program, bounded by a timeout, and capture its exit code and
/// output. Tests substitute a scripted implementation.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CmdOutput>;
}

/// Real runner on top of tokio's process support.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CmdOutput> {
        trace!("running command: {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChangerError::device(format!("cannot run '{program}': {e}")))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ChangerError::device(format!(
                    "command '{}' did not finish within {} seconds",
                    program,
                    timeout.as_secs()
                ))
            })??;

        let result = CmdOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(
            "returncode: {}, stdout: {}, stderr: {}",
            result.code,
            if result.stdout.is_empty() { "N/A" } else { result.stdout.trim_end() },
            if result.stderr.is_empty() { "N/A" } else { result.stderr.trim_end() },
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_code_and_stdout() {
        let out = SystemRunner
            .run("sh", &["-c", "echo hello; echo oops >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.code, 3);
        assert!(!out.success());
        assert_eq!(out.stdout.trim_end(), "hello");
        assert_eq!(out.stderr.trim_end(), "oops");
    }

    #[tokio::test]
    async fn missing_binary_is_a_device_error() {
        let err = SystemRunner
            .run("/no/such/binary", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ChangerError::Device(_)));
    }

    #[tokio::test]
    async fn stalled_command_hits_the_timeout() {
        let err = SystemRunner
            .run("sh", &["-c", "sleep 5"], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ChangerError::Device(_)));
    }
}
