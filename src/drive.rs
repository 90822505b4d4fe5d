use regex::Regex;

/// Tapeinfo codes that mean the drive is asking to be cleaned.
/// 20 = "Clean Now", 21 = "Clean Periodic".
const CLEANING_ALERT_CODES: &[u32] = &[20, 21];

/// Transient readiness signal read off one `mt status` query.
///
/// `Online` means the drive has a mounted, settled volume; the volume's
/// label is known from the inventory snapshot, not from `mt` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveReadiness {
    Online,
    Empty,
    Offline,
}

impl DriveReadiness {
    /// Interpret raw `mt status` output. `ready_str` is the platform's
    /// ready marker (for mt-st on Linux, "ONLINE").
    pub fn parse(status: &str, ready_str: &str) -> Self {
        if status.contains(ready_str) {
            DriveReadiness::Online
        } else if status.contains("DR_OPEN") {
            DriveReadiness::Empty
        } else {
            DriveReadiness::Offline
        }
    }

    pub fn is_online(self) -> bool {
        self == DriveReadiness::Online
    }
}

/// One `TapeAlert[NN]: message` line from tapeinfo output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeAlert {
    pub code: u32,
    pub message: String,
}

/// Extract the TapeAlert lines from raw tapeinfo output, e.g.
///
/// ```text
/// TapeAlert[20]:     Clean Now: The tape drive needs cleaning NOW.
/// TapeAlert[21]: Clean Periodic:The tape drive needs to be cleaned at next opportunity.
/// ```
pub fn parse_tape_alerts(text: &str) -> Vec<TapeAlert> {
    let shape = Regex::new(r"TapeAlert\[(\d+)\]:\s*(.*)").unwrap();
    shape
        .captures_iter(text)
        .filter_map(|caps| {
            let code = caps[1].parse().ok()?;
            Some(TapeAlert {
                code,
                message: caps[2].trim_end().to_string(),
            })
        })
        .collect()
}

/// Whether the SCSI log query says the drive wants cleaning.
///
/// `Unknown` is produced by the caller when the query itself fails; it is
/// treated downstream exactly like `NotRequired` (never force a clean on an
/// ambiguous signal) but logged distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningSignal {
    Required,
    NotRequired,
    Unknown,
}

pub fn cleaning_signal(alerts: &[TapeAlert]) -> CleaningSignal {
    if alerts
        .iter()
        .any(|alert| CLEANING_ALERT_CODES.contains(&alert.code))
    {
        CleaningSignal::Required
    } else {
        CleaningSignal::NotRequired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_drive_reports_ready() {
        let status = "SCSI 2 tape drive:\nFile number=0, block number=0, partition=0.\n\
                      General status bits on (41010000):\n BOT ONLINE IM_REP_EN";
        assert_eq!(DriveReadiness::parse(status, "ONLINE"), DriveReadiness::Online);
        assert!(DriveReadiness::parse(status, "ONLINE").is_online());
    }

    #[test]
    fn open_door_means_empty() {
        let status = "General status bits on (50000):\n DR_OPEN IM_REP_EN";
        assert_eq!(DriveReadiness::parse(status, "ONLINE"), DriveReadiness::Empty);
    }

    #[test]
    fn anything_else_is_offline() {
        assert_eq!(
            DriveReadiness::parse("General status bits on (0):", "ONLINE"),
            DriveReadiness::Offline
        );
    }

    #[test]
    fn custom_ready_marker_is_honored() {
        let status = "Current Driver State: at rest.";
        assert_eq!(
            DriveReadiness::parse(status, "Current Driver State: at rest."),
            DriveReadiness::Online
        );
    }

    #[test]
    fn parses_tape_alert_lines() {
        let text = "Product Type: Tape Drive\n\
                    TapeAlert[11]: Cleaning Media:Cannot back up or restore to a cleaning cartridge.\n\
                    TapeAlert[15]: Undefined.\n\
                    TapeAlert[20]:     Clean Now: The tape drive needs cleaning NOW.\n";
        let alerts = parse_tape_alerts(text);
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].code, 11);
        assert_eq!(alerts[2].code, 20);
        assert!(alerts[2].message.starts_with("Clean Now"));
    }

    #[test]
    fn clean_now_and_clean_periodic_require_cleaning() {
        for code in [20, 21] {
            let alerts = vec![TapeAlert {
                code,
                message: String::new(),
            }];
            assert_eq!(cleaning_signal(&alerts), CleaningSignal::Required);
        }
    }

    #[test]
    fn unrelated_alerts_do_not_require_cleaning() {
        let alerts = parse_tape_alerts("TapeAlert[15]: Undefined.\n");
        assert_eq!(cleaning_signal(&alerts), CleaningSignal::NotRequired);
        assert_eq!(cleaning_signal(&[]), CleaningSignal::NotRequired);
    }
}
