//! Automatic drive-cleaning cycle, run as a trailing step of a successful
//! unload when `chk_drive` is enabled.
//!
//! The cycle walks CheckRequired -> LoadCleaningTape -> Waiting ->
//! UnloadCleaningTape and is best-effort throughout: every early exit is an
//! `Ok(())`, and the caller logs (never propagates) an `Err`, so the
//! already-successful unload keeps its exit code.

use crate::changer::Changer;
use crate::drive::CleaningSignal;
use crate::error::Result;
use crate::exec::CommandRunner;
use std::time::Duration;
use tracing::{debug, info, warn};

pub async fn run_after_unload<R: CommandRunner>(changer: &Changer<'_, R>) -> Result<()> {
    // CheckRequired: ask the SCSI logs of the just-vacated drive.
    match changer.query_cleaning_signal().await {
        CleaningSignal::NotRequired => {
            debug!("no drive-cleaning tape alerts detected");
            return Ok(());
        }
        CleaningSignal::Unknown => {
            // Fail open: never force a clean on an ambiguous signal.
            warn!("cleaning state could not be determined, skipping automatic cleaning");
            return Ok(());
        }
        CleaningSignal::Required => {}
    }
    if !changer.cfg.auto_clean {
        warn!("drive requires cleaning but auto_clean is disabled, skipping");
        return Ok(());
    }

    // LoadCleaningTape: find a cleaning cartridge by label prefix. Tapes
    // already sitting in drives are never candidates.
    let inventory = changer.fetch_inventory().await?;
    let candidates =
        inventory.cleaning_tapes(&changer.cfg.cln_str, changer.cfg.include_import_export);
    let Some(tape) = candidates.first() else {
        info!("no cleaning tapes found in the library, skipping automatic cleaning");
        return Ok(());
    };
    let slot = tape.index;
    let volume = tape.label().to_string();
    info!(
        "loading cleaning tape ({}) from slot {} into drive index {}",
        volume, slot, changer.req.drive_index
    );
    changer.issue_load(slot, &volume).await?;

    // Waiting: give the drive's internal cleaning cycle time to finish.
    // Cleaning cartridges do not report a normal ready state, so this is a
    // plain delay rather than a readiness poll.
    debug!(
        "cleaning tape loaded, waiting clean_wait time of {} seconds",
        changer.cfg.clean_wait
    );
    tokio::time::sleep(Duration::from_secs(changer.cfg.clean_wait)).await;

    // UnloadCleaningTape: return the cartridge to the slot it came from.
    info!(
        "unloading cleaning tape ({}) back to slot {}",
        volume, slot
    );
    changer.issue_unload(slot, &volume).await?;

    // One more tapeinfo query clears the leftover "Cleaning Media" alert
    // the cartridge itself raises. The outcome is irrelevant.
    let _ = changer.query_cleaning_signal().await;
    Ok(())
}
