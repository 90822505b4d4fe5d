use crate::error::{ChangerError, Result};
use serde::Deserialize;
use std::path::Path;
use toml::Value;
use tracing::debug;

/// Every tunable the changer honors, with the shipped defaults.
///
/// The configuration file is TOML: top-level keys are the defaults and each
/// named table is a section selectable with `-s`, overriding the defaults
/// key by key. Multi-library sites typically keep one section per changer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChangerConfig {
    /// Friendly changer name, prefixed to log lines when non-empty.
    pub chgr_name: String,
    /// Binaries used for all physical control.
    pub mtx_bin: String,
    pub mt_bin: String,
    pub tapeinfo_bin: String,
    /// Bacula-style log verbosity, 0..=50.
    pub debug_level: u8,
    /// Log the effective configuration at startup.
    pub log_cfg_vars: bool,
    /// Maximum seconds to wait for a drive to report ready after a load.
    pub load_wait: u64,
    /// Extra settle delay after the drive reports ready, seconds.
    pub load_sleep: u64,
    /// Send the drive an offline command before unloading.
    pub offline: bool,
    /// Settle delay after the offline command, seconds.
    pub offline_sleep: u64,
    /// Run `mtx inventory` before every status query.
    pub inventory: bool,
    /// Treat import/export slots as eligible sources and destinations.
    pub include_import_export: bool,
    /// After a successful unload, check whether the drive wants cleaning.
    pub chk_drive: bool,
    /// Actually run a cleaning cycle when the drive asks for one.
    pub auto_clean: bool,
    /// Seconds to leave a cleaning tape in the drive.
    pub clean_wait: u64,
    /// Volume-label prefix identifying cleaning cartridges.
    pub cln_str: String,
    /// Accept the VXA PacketLoader storage-element line phrasing.
    pub vxa_packetloader: bool,
    /// Substring of `mt status` output that marks the drive ready.
    pub ready_str: String,
    /// Hard ceiling on any single external command, seconds.
    pub command_timeout: u64,
    /// Trim the datestamp suffix off job names before logging.
    pub strip_jobname: bool,
}

impl Default for ChangerConfig {
    fn default() -> Self {
        Self {
            chgr_name: String::new(),
            mtx_bin: "mtx".to_string(),
            mt_bin: "mt".to_string(),
            tapeinfo_bin: "tapeinfo".to_string(),
            debug_level: 10,
            log_cfg_vars: false,
            load_wait: 300,
            load_sleep: 0,
            offline: false,
            offline_sleep: 0,
            inventory: false,
            include_import_export: false,
            chk_drive: false,
            auto_clean: false,
            clean_wait: 90,
            cln_str: "CLN".to_string(),
            vxa_packetloader: false,
            ready_str: "ONLINE".to_string(),
            command_timeout: 300,
            strip_jobname: false,
        }
    }
}

impl ChangerConfig {
    /// Load a config file and resolve `section` over the top-level defaults.
    ///
    /// Fails fast before any hardware interaction: a missing file, bad TOML,
    /// an unknown key or a missing section are all `ConfigError`.
    pub fn load(path: &Path, section: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ChangerError::config(format!(
                "cannot read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&text, section)
            .map_err(|e| match e {
                ChangerError::Config(msg) => {
                    ChangerError::config(format!("in '{}': {}", path.display(), msg))
                }
                other => other,
            })
            .and_then(Self::validated)
    }

    fn from_toml(text: &str, section: &str) -> Result<Self> {
        let root: toml::Table = text
            .parse()
            .map_err(|e| ChangerError::config(format!("invalid TOML: {e}")))?;

        let mut merged = toml::Table::new();
        for (key, value) in &root {
            if !matches!(value, Value::Table(_)) {
                merged.insert(key.clone(), value.clone());
            }
        }
        if section != "default" {
            match root.get(section) {
                Some(Value::Table(table)) => {
                    for (key, value) in table {
                        merged.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    return Err(ChangerError::config(format!(
                        "section [{section}] does not exist"
                    )));
                }
            }
        }

        Value::Table(merged)
            .try_into()
            .map_err(|e| ChangerError::config(e.to_string()))
    }

    fn validated(self) -> Result<Self> {
        if self.command_timeout == 0 {
            return Err(ChangerError::config("command_timeout must be non-zero"));
        }
        if self.cln_str.is_empty() && (self.chk_drive || self.auto_clean) {
            return Err(ChangerError::config(
                "cln_str must be set when chk_drive or auto_clean is enabled",
            ));
        }
        Ok(self)
    }

    pub fn log_vars(&self) {
        debug!("effective configuration: {:?}", self);
    }
}
