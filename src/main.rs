use mtx_changer::changer::Changer;
use mtx_changer::cli::{Cli, OperationRequest};
use mtx_changer::config::ChangerConfig;
use mtx_changer::error::Result;
use mtx_changer::exec::SystemRunner;
use mtx_changer::logger;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    let args = Cli::parse_args();

    // Configuration comes first: debug_level decides the log filter.
    // A bad config fails fast, before any hardware interaction.
    let cfg = match load_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("Err: {e}");
            std::process::exit(1);
        }
    };
    // Logging is fire-and-forget; a broken subscriber never stops work.
    let _ = logger::init(cfg.debug_level);

    let request = OperationRequest::from_cli(&args, cfg.strip_jobname);
    info!(
        "starting: changer {} command {:?} slot {} drive {} (index {}){}{}",
        request.changer_device,
        request.command,
        request.slot,
        request.drive_device,
        request.drive_index,
        request
            .jobid
            .as_deref()
            .map(|id| format!(" jobid {id}"))
            .unwrap_or_default(),
        request
            .jobname
            .as_deref()
            .map(|name| format!(" job {name}"))
            .unwrap_or_default(),
    );
    if !cfg.chgr_name.is_empty() {
        info!("changer name: {}", cfg.chgr_name);
    }
    if cfg.log_cfg_vars {
        cfg.log_vars();
    }

    match run(&cfg, &request).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            debug!("exiting with return code 0");
        }
        Err(e) => {
            // The storage daemon prints this stdout after 'Result=' in the
            // job log.
            println!("Err: {e}");
            debug!("exiting with return code 1");
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Cli) -> Result<ChangerConfig> {
    match &args.config {
        Some(path) => ChangerConfig::load(path, &args.section),
        None => Ok(ChangerConfig::default()),
    }
}

async fn run(cfg: &ChangerConfig, request: &OperationRequest) -> Result<String> {
    let runner = SystemRunner;
    Changer::new(cfg, request, &runner).run().await
}
