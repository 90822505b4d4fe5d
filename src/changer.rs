use crate::cli::{MtxCommand, OperationRequest};
use crate::clean;
use crate::config::ChangerConfig;
use crate::drive::{cleaning_signal, parse_tape_alerts, CleaningSignal, DriveReadiness};
use crate::error::{ChangerError, Result};
use crate::exec::{CmdOutput, CommandRunner};
use crate::inventory::{Inventory, SlotKind, StatusFormat, StatusParser};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Interval between drive readiness polls while waiting out `load_wait`.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const TRANSFER_REFUSED: &str =
    "The source slot is empty, or the destination slot is full. Will not even attempt the transfer";

/// The operation engine: dispatches one command against the library,
/// validating preconditions against a freshly built inventory before any
/// hardware command is issued.
///
/// The inventory is deliberately re-read at every point it is consulted;
/// nothing is cached across the steps of an invocation.
pub struct Changer<'a, R: CommandRunner> {
    pub(crate) cfg: &'a ChangerConfig,
    pub(crate) req: &'a OperationRequest,
    pub(crate) runner: &'a R,
}

impl<'a, R: CommandRunner> Changer<'a, R> {
    pub fn new(cfg: &'a ChangerConfig, req: &'a OperationRequest, runner: &'a R) -> Self {
        Self { cfg, req, runner }
    }

    /// Run the requested operation and return its stdout payload
    /// (empty for the movement commands).
    pub async fn run(&self) -> Result<String> {
        match self.req.command {
            MtxCommand::Slots => self.do_slots().await,
            MtxCommand::List => self.do_list().await,
            MtxCommand::Listall => self.do_listall().await,
            MtxCommand::Loaded => self.do_loaded().await,
            MtxCommand::Load => self.do_load().await,
            MtxCommand::Unload => self.do_unload().await,
            MtxCommand::Transfer => self.do_transfer().await,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.cfg.command_timeout)
    }

    async fn mtx(&self, args: &[&str]) -> Result<CmdOutput> {
        let mut full_args = vec!["-f", self.req.changer_device.as_str()];
        full_args.extend_from_slice(args);
        self.runner
            .run(&self.cfg.mtx_bin, &full_args, self.timeout())
            .await
    }

    /// One status query (plus the optional inventory refresh some libraries
    /// need), parsed into a fresh snapshot.
    pub(crate) async fn fetch_inventory(&self) -> Result<Inventory> {
        if self.cfg.inventory {
            debug!("running mtx inventory before the status query");
            let out = self.mtx(&["inventory"]).await?;
            if !out.success() {
                return Err(ChangerError::device(format!(
                    "mtx inventory failed: {}",
                    out.stderr.trim_end()
                )));
            }
        }
        let out = self.mtx(&["status"]).await?;
        if !out.success() {
            return Err(ChangerError::device(format!(
                "mtx status failed: {}",
                out.stderr.trim_end()
            )));
        }
        let format = if self.cfg.vxa_packetloader {
            StatusFormat::VxaPacketLoader
        } else {
            StatusFormat::Mtx
        };
        StatusParser::new(format).parse(&out.stdout)
    }

    async fn do_slots(&self) -> Result<String> {
        debug!("determining the number of storage slots in the library");
        let inventory = self.fetch_inventory().await?;
        Ok(inventory.storage_slot_count().to_string())
    }

    async fn do_list(&self) -> Result<String> {
        let inventory = self.fetch_inventory().await?;
        let lines: Vec<String> = inventory
            .locations()
            .iter()
            .filter(|loc| {
                loc.full
                    && match loc.kind {
                        SlotKind::Storage => true,
                        SlotKind::ImportExport => self.cfg.include_import_export,
                        SlotKind::Drive => false,
                    }
            })
            .map(|loc| format!("{}:{}", loc.index, loc.label()))
            .collect();
        Ok(lines.join("\n"))
    }

    async fn do_listall(&self) -> Result<String> {
        let inventory = self.fetch_inventory().await?;
        let lines: Vec<String> = inventory
            .locations()
            .iter()
            .map(|loc| loc.listall_line())
            .collect();
        Ok(lines.join("\n"))
    }

    async fn do_loaded(&self) -> Result<String> {
        let inventory = self.fetch_inventory().await?;
        let drive = inventory.drive(self.req.drive_index).ok_or_else(|| {
            ChangerError::precondition(format!(
                "Drive index {} does not exist in the library",
                self.req.drive_index
            ))
        })?;
        if !drive.full {
            debug!(
                "drive device {} (drive index: {}) is empty",
                self.req.drive_device, self.req.drive_index
            );
            return Ok("0".to_string());
        }
        let slot = drive.source_slot.unwrap_or(0);
        if drive.source_slot.is_none() {
            warn!(
                "drive index {} is loaded but the changer did not report a source slot",
                self.req.drive_index
            );
        }
        debug!(
            "drive device {} (drive index: {}) is loaded with volume ({}) from slot {}",
            self.req.drive_device,
            self.req.drive_index,
            drive.label(),
            slot
        );
        Ok(slot.to_string())
    }

    async fn do_load(&self) -> Result<String> {
        let inventory = self.fetch_inventory().await?;
        let slot = inventory
            .slot(self.req.slot, self.cfg.include_import_export)
            .ok_or_else(|| {
                ChangerError::precondition(format!(
                    "Slot {} does not exist in the library",
                    self.req.slot
                ))
            })?;
        if !slot.full {
            return Err(ChangerError::precondition(format!(
                "Slot {} is empty, will not attempt the load",
                self.req.slot
            )));
        }
        let drive = inventory.drive(self.req.drive_index).ok_or_else(|| {
            ChangerError::precondition(format!(
                "Drive index {} does not exist in the library",
                self.req.drive_index
            ))
        })?;
        if drive.full {
            return Err(ChangerError::precondition(format!(
                "Drive device {} (drive index: {}) is already loaded",
                self.req.drive_device, self.req.drive_index
            )));
        }

        let volume = slot.label().to_string();
        info!(
            "loading volume ({}) from slot {} into drive device {} (drive index: {})",
            volume, self.req.slot, self.req.drive_device, self.req.drive_index
        );
        self.issue_load(self.req.slot, &volume).await?;
        self.wait_for_drive_ready().await?;
        if self.cfg.load_sleep > 0 {
            debug!(
                "sleeping for load_sleep time of {} seconds to let the drive settle",
                self.cfg.load_sleep
            );
            tokio::time::sleep(Duration::from_secs(self.cfg.load_sleep)).await;
        }
        debug!(
            "successfully loaded volume ({}) from slot {} into drive index {}",
            volume, self.req.slot, self.req.drive_index
        );
        Ok(String::new())
    }

    async fn do_unload(&self) -> Result<String> {
        let inventory = self.fetch_inventory().await?;
        let drive = inventory.drive(self.req.drive_index).ok_or_else(|| {
            ChangerError::precondition(format!(
                "Drive index {} does not exist in the library",
                self.req.drive_index
            ))
        })?;
        if !drive.full {
            return Err(ChangerError::precondition(format!(
                "Drive device {} (drive index: {}) is empty, will not attempt the unload",
                self.req.drive_device, self.req.drive_index
            )));
        }
        let slot = inventory
            .slot(self.req.slot, self.cfg.include_import_export)
            .ok_or_else(|| {
                ChangerError::precondition(format!(
                    "Slot {} does not exist in the library",
                    self.req.slot
                ))
            })?;
        if slot.full {
            return Err(ChangerError::precondition(format!(
                "Slot {} is full with volume ({}), will not attempt the unload",
                self.req.slot,
                slot.label()
            )));
        }

        let volume = drive.label().to_string();
        info!(
            "unloading volume ({}) from drive device {} (drive index: {}) to slot {}",
            volume, self.req.drive_device, self.req.drive_index, self.req.slot
        );
        self.issue_unload(self.req.slot, &volume).await?;
        debug!(
            "successfully unloaded volume ({}) from drive index {} to slot {}",
            volume, self.req.drive_index, self.req.slot
        );

        // Best-effort trailing step: a failed cleaning cycle never flips the
        // outcome of the unload that already succeeded.
        if self.cfg.chk_drive {
            if let Err(e) = clean::run_after_unload(self).await {
                warn!("drive cleaning cycle failed: {e}");
            }
        } else {
            debug!("chk_drive is disabled, skipping tapeinfo checks");
        }
        Ok(String::new())
    }

    async fn do_transfer(&self) -> Result<String> {
        let dst_slot = self.req.destination_slot().ok_or_else(|| {
            ChangerError::precondition(format!(
                "The destination slot '{}' is not a valid slot number",
                self.req.drive_device
            ))
        })?;
        let inventory = self.fetch_inventory().await?;
        let src_full = inventory
            .slot(self.req.slot, self.cfg.include_import_export)
            .map(|loc| loc.full)
            .unwrap_or(false);
        let dst_full = inventory
            .slot(dst_slot, self.cfg.include_import_export)
            .map(|loc| loc.full)
            .unwrap_or(false);
        if !src_full || dst_full {
            return Err(ChangerError::precondition(TRANSFER_REFUSED));
        }

        info!(
            "transferring volume from slot {} to slot {}",
            self.req.slot, dst_slot
        );
        let slot_arg = self.req.slot.to_string();
        let dst_arg = dst_slot.to_string();
        let out = self.mtx(&["transfer", &slot_arg, &dst_arg]).await?;
        if !out.success() {
            return Err(ChangerError::device(format!(
                "Unsuccessfully transferred volume from slot {} to slot {} Err: {}",
                self.req.slot,
                dst_slot,
                out.stderr.trim_end()
            )));
        }
        debug!(
            "successfully transferred volume from slot {} to slot {}",
            self.req.slot, dst_slot
        );
        Ok(String::new())
    }

    /// Issue the raw changer load command. Used by the load operation and
    /// by the cleaning cycle, which re-targets the just-vacated drive.
    pub(crate) async fn issue_load(&self, slot: u32, volume: &str) -> Result<()> {
        let slot_arg = slot.to_string();
        let idx_arg = self.req.drive_index.to_string();
        let out = self.mtx(&["load", &slot_arg, &idx_arg]).await?;
        if !out.success() {
            return Err(ChangerError::device(format!(
                "Failed to load drive device {} (drive index: {}) with volume ({}) from slot {} Err: {}",
                self.req.drive_device,
                self.req.drive_index,
                volume,
                slot,
                out.stderr.trim_end()
            )));
        }
        Ok(())
    }

    /// Issue the raw changer unload command, preceded by the optional
    /// drive offline sequence.
    pub(crate) async fn issue_unload(&self, slot: u32, volume: &str) -> Result<()> {
        if self.cfg.offline {
            debug!(
                "offline is enabled, sending drive device {} offline before unloading",
                self.req.drive_device
            );
            let out = self
                .runner
                .run(
                    &self.cfg.mt_bin,
                    &["-f", &self.req.drive_device, "offline"],
                    self.timeout(),
                )
                .await?;
            if !out.success() {
                return Err(ChangerError::device(format!(
                    "mt offline failed for drive device {}: {}",
                    self.req.drive_device,
                    out.stderr.trim_end()
                )));
            }
            if self.cfg.offline_sleep > 0 {
                debug!(
                    "sleeping for offline_sleep time of {} seconds before unloading",
                    self.cfg.offline_sleep
                );
                tokio::time::sleep(Duration::from_secs(self.cfg.offline_sleep)).await;
            }
        }
        let slot_arg = slot.to_string();
        let idx_arg = self.req.drive_index.to_string();
        let out = self.mtx(&["unload", &slot_arg, &idx_arg]).await?;
        if !out.success() {
            return Err(ChangerError::device(format!(
                "Failed to unload drive device {} (drive index: {}) with volume ({}) to slot {} Err: {}",
                self.req.drive_device,
                self.req.drive_index,
                volume,
                slot,
                out.stderr.trim_end()
            )));
        }
        Ok(())
    }

    /// Poll the drive at a fixed interval until it reports ready, bounded
    /// by `load_wait` seconds. A stalled drive becomes a reported failure,
    /// never an indefinite hang.
    pub(crate) async fn wait_for_drive_ready(&self) -> Result<()> {
        debug!(
            "waiting a maximum of {} load_wait seconds for the drive to become ready",
            self.cfg.load_wait
        );
        let deadline = Instant::now() + Duration::from_secs(self.cfg.load_wait);
        loop {
            let out = self
                .runner
                .run(
                    &self.cfg.mt_bin,
                    &["-f", &self.req.drive_device, "status"],
                    self.timeout(),
                )
                .await?;
            if !out.success() {
                return Err(ChangerError::device(format!(
                    "mt status failed for drive device {}: {}",
                    self.req.drive_device,
                    out.stderr.trim_end()
                )));
            }
            if DriveReadiness::parse(&out.stdout, &self.cfg.ready_str).is_online() {
                debug!(
                    "drive device {} (drive index: {}) reports ready",
                    self.req.drive_device, self.req.drive_index
                );
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ChangerError::device(format!(
                    "timeout: drive device {} (drive index: {}) did not become ready within {} load_wait seconds; perhaps the drive index is incorrect",
                    self.req.drive_device, self.req.drive_index, self.cfg.load_wait
                )));
            }
            debug!(
                "drive device {} not ready, sleeping for one second and retrying",
                self.req.drive_device
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Ask tapeinfo whether the just-vacated drive wants cleaning. A failed
    /// or unrunnable query is an `Unknown` signal, never an error: cleaning
    /// is best-effort and fails open.
    pub(crate) async fn query_cleaning_signal(&self) -> CleaningSignal {
        let out = self
            .runner
            .run(
                &self.cfg.tapeinfo_bin,
                &["-f", &self.req.drive_device],
                self.timeout(),
            )
            .await;
        match out {
            Ok(out) if out.success() => {
                let alerts = parse_tape_alerts(&out.stdout);
                for alert in &alerts {
                    debug!("TapeAlert[{}]: {}", alert.code, alert.message);
                }
                cleaning_signal(&alerts)
            }
            Ok(out) => {
                warn!(
                    "tapeinfo exited with code {}, cleaning state is unknown",
                    out.code
                );
                CleaningSignal::Unknown
            }
            Err(e) => {
                warn!("tapeinfo could not be run ({e}), cleaning state is unknown");
                CleaningSignal::Unknown
            }
        }
    }
}
