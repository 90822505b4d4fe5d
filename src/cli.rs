use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Command-line surface expected by the backup storage daemon, e.g.
/// `ChangerCommand = "mtx-changer %c %o %S %a %d %i %j"`.
///
/// All positional arguments are always passed even when an operation does
/// not use them; `slot` may be `0` as a placeholder for the query commands.
#[derive(Parser, Debug)]
#[command(name = "mtx-changer")]
#[command(about = "Control a robotic tape-library changer on behalf of a backup scheduler")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Section in the configuration file
    #[arg(short, long, value_name = "SECTION", default_value = "default")]
    pub section: String,

    /// The library's /dev/sg#, /dev/tape/by-id/* or /dev/tape/by-path/* node
    #[arg(value_name = "CHGR_DEVICE")]
    pub changer_device: String,

    /// The operation to perform
    #[arg(value_enum, value_name = "MTX_CMD")]
    pub command: MtxCommand,

    /// One-based library slot to load/unload, or the source slot for transfer
    #[arg(value_name = "SLOT")]
    pub slot: u32,

    /// The drive's /dev/nst# style node, or the destination slot for transfer
    #[arg(value_name = "DRIVE_DEVICE")]
    pub drive_device: String,

    /// The zero-based drive index
    #[arg(value_name = "DRIVE_INDEX")]
    pub drive_index: u32,

    /// Optional job id, logged with every line
    #[arg(value_name = "JOBID")]
    pub jobid: Option<String>,

    /// Optional job name, logged with every line
    #[arg(value_name = "JOBNAME")]
    pub jobname: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "lowercase")]
pub enum MtxCommand {
    /// Print the number of storage slots in the library
    Slots,
    /// List occupied slots in slot:volume format
    List,
    /// List every element in D:/S:/I: format
    Listall,
    /// Print the slot loaded in a drive, or 0 if the drive is empty
    Loaded,
    /// Load a slot into a drive
    Load,
    /// Unload a drive back to a slot
    Unload,
    /// Move a volume from one slot to another
    Transfer,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// The validated, immutable per-invocation request handed to the engine.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub changer_device: String,
    pub command: MtxCommand,
    pub slot: u32,
    pub drive_device: String,
    pub drive_index: u32,
    pub jobid: Option<String>,
    pub jobname: Option<String>,
}

impl OperationRequest {
    pub fn from_cli(cli: &Cli, strip_jobname: bool) -> Self {
        let jobname = cli.jobname.as_ref().map(|name| {
            if strip_jobname {
                strip_job_datestamp(name)
            } else {
                name.clone()
            }
        });
        Self {
            changer_device: cli.changer_device.clone(),
            command: cli.command,
            slot: cli.slot,
            drive_device: cli.drive_device.clone(),
            drive_index: cli.drive_index,
            jobid: cli.jobid.clone(),
            jobname,
        }
    }

    /// For `transfer` the storage daemon sends the destination slot in the
    /// drive-device position of the command line.
    pub fn destination_slot(&self) -> Option<u32> {
        self.drive_device.parse().ok()
    }
}

/// Trim the `.YYYY-MM-DD_...` datestamp the scheduler appends to job names.
/// Job names may themselves contain dots, so every dot is a candidate.
fn strip_job_datestamp(name: &str) -> String {
    for (pos, _) in name.match_indices('.') {
        let tail = &name[pos + 1..];
        let looks_dated = tail.len() >= 10
            && tail.as_bytes()[4] == b'-'
            && tail.as_bytes()[7] == b'-'
            && tail[..4].bytes().all(|b| b.is_ascii_digit());
        if looks_dated {
            return name[..pos].to_string();
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_command_line() {
        let cli = Cli::try_parse_from([
            "mtx-changer",
            "-c",
            "/etc/mtx-changer.toml",
            "-s",
            "library1",
            "/dev/tape/by-id/scsi-SSTK_L80_XYZZY_B",
            "load",
            "29",
            "/dev/nst0",
            "0",
            "1234",
            "Backup.2023-05-29_23.05.01_03",
        ])
        .unwrap();
        assert_eq!(cli.command, MtxCommand::Load);
        assert_eq!(cli.slot, 29);
        assert_eq!(cli.drive_index, 0);
        assert_eq!(cli.section, "library1");
        assert_eq!(cli.jobid.as_deref(), Some("1234"));
    }

    #[test]
    fn defaults_section_and_allows_placeholder_slot() {
        let cli =
            Cli::try_parse_from(["mtx-changer", "/dev/sg2", "slots", "0", "/dev/nst0", "0"])
                .unwrap();
        assert_eq!(cli.section, "default");
        assert_eq!(cli.command, MtxCommand::Slots);
        assert_eq!(cli.slot, 0);
        assert!(cli.jobname.is_none());
    }

    #[test]
    fn rejects_unknown_operation() {
        let cli = Cli::try_parse_from(["mtx-changer", "/dev/sg2", "eject", "0", "/dev/nst0", "0"]);
        assert!(cli.is_err());
    }

    #[test]
    fn transfer_destination_comes_from_drive_device_position() {
        let cli =
            Cli::try_parse_from(["mtx-changer", "/dev/sg2", "transfer", "29", "31", "0"]).unwrap();
        let req = OperationRequest::from_cli(&cli, false);
        assert_eq!(req.destination_slot(), Some(31));
    }

    #[test]
    fn strips_job_datestamp_when_configured() {
        let cli = Cli::try_parse_from([
            "mtx-changer",
            "/dev/sg2",
            "unload",
            "1",
            "/dev/nst0",
            "0",
            "55",
            "NightlyFull.2023-09-08_21.00.00_05",
        ])
        .unwrap();
        let req = OperationRequest::from_cli(&cli, true);
        assert_eq!(req.jobname.as_deref(), Some("NightlyFull"));

        let req = OperationRequest::from_cli(&cli, false);
        assert_eq!(
            req.jobname.as_deref(),
            Some("NightlyFull.2023-09-08_21.00.00_05")
        );
    }
}
