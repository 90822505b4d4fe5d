use crate::error::{ChangerError, Result};
use regex::Regex;
use tracing::{debug, warn};

/// Physical element classes inside the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Drive,
    Storage,
    ImportExport,
}

/// One physical position in the library address space.
///
/// Drives are zero-based; storage and import/export slots share a single
/// one-based sequence. `source_slot` is reported by the changer for loaded
/// drives only ("(Storage Element N Loaded)") and is what correlates a
/// drive's volume back to the slot it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLocation {
    pub kind: SlotKind,
    pub index: u32,
    pub full: bool,
    /// Barcode label, when the library reported one. Libraries without a
    /// barcode reader report Full elements with no VolumeTag.
    pub volume: Option<String>,
    pub source_slot: Option<u32>,
}

impl SlotLocation {
    /// The barcode label, or an empty string for unlabeled cartridges.
    pub fn label(&self) -> &str {
        self.volume.as_deref().unwrap_or("")
    }

    /// The `listall` wire format consumed by the storage daemon:
    /// `D:0:F:5:G03005TA`, `D:3:E`, `S:2:F:G03002TA`, `S:1:E`,
    /// `I:41:F:G03029TA`, `I:42:E`.
    pub fn listall_line(&self) -> String {
        let tag = match self.kind {
            SlotKind::Drive => 'D',
            SlotKind::Storage => 'S',
            SlotKind::ImportExport => 'I',
        };
        match (self.kind, self.full) {
            (_, false) => format!("{}:{}:E", tag, self.index),
            (SlotKind::Drive, true) => format!(
                "{}:{}:F:{}:{}",
                tag,
                self.index,
                self.source_slot.unwrap_or(0),
                self.label()
            ),
            (_, true) => format!("{}:{}:F:{}", tag, self.index, self.label()),
        }
    }

    /// Inverse of [`listall_line`](Self::listall_line), used to re-read a
    /// previously emitted listing.
    pub fn from_listall_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, ':');
        let tag = parts.next()?;
        let index: u32 = parts.next()?.parse().ok()?;
        let rest = parts.next()?;
        let kind = match tag {
            "D" => SlotKind::Drive,
            "S" => SlotKind::Storage,
            "I" => SlotKind::ImportExport,
            _ => return None,
        };
        if rest == "E" {
            return Some(Self {
                kind,
                index,
                full: false,
                volume: None,
                source_slot: None,
            });
        }
        let payload = rest.strip_prefix("F:")?;
        let (source_slot, label) = if kind == SlotKind::Drive {
            let (slot, label) = payload.split_once(':')?;
            (Some(slot.parse().ok()?), label)
        } else {
            (None, payload)
        };
        Some(Self {
            kind,
            index,
            full: true,
            volume: (!label.is_empty()).then(|| label.to_string()),
            source_slot,
        })
    }
}

/// The closed set of status-text dialects the parser understands.
///
/// `VxaPacketLoader` additionally accepts the looser storage-element
/// phrasing emitted by VXA PacketLoader libraries, where arbitrary text may
/// sit between the element number and the Full/Empty marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFormat {
    Mtx,
    VxaPacketLoader,
}

/// Line-shape matchers for one `mtx status` dialect, compiled once per
/// invocation.
pub struct StatusParser {
    drive_empty: Regex,
    drive_full: Regex,
    import_export: Regex,
    storage_empty: Regex,
    storage_full: Regex,
    packetloader_empty: Regex,
    packetloader_full: Regex,
    format: StatusFormat,
}

impl StatusParser {
    pub fn new(format: StatusFormat) -> Self {
        Self {
            drive_empty: Regex::new(r"^Data Transfer Element (\d+):Empty").unwrap(),
            drive_full: Regex::new(
                r"^Data Transfer Element (\d+):Full(?: \(Storage Element (\d+) Loaded\))?(?::VolumeTag\s*=\s*(\S+))?",
            )
            .unwrap(),
            import_export: Regex::new(
                r"^\s*Storage Element (\d+) IMPORT[/.]EXPORT:(?:(Empty)|Full(?:\s*:VolumeTag\s*=\s*(\S+))?)",
            )
            .unwrap(),
            storage_empty: Regex::new(r"^\s*Storage Element (\d+):Empty").unwrap(),
            storage_full: Regex::new(r"^\s*Storage Element (\d+):Full(?:\s*:VolumeTag\s*=\s*(\S+))?")
                .unwrap(),
            packetloader_empty: Regex::new(r"^\s*Storage Element (\d+):.*Empty").unwrap(),
            packetloader_full: Regex::new(
                r"^\s*Storage Element (\d+):.*Full\s*:VolumeTag\s*=\s*(\S+)",
            )
            .unwrap(),
            format,
        }
    }

    /// Build an [`Inventory`] from raw `mtx status` output.
    ///
    /// Lines matching no known shape (the "Storage Changer ..." header
    /// among them) are skipped; producing zero locations is a parse error.
    pub fn parse(&self, text: &str) -> Result<Inventory> {
        let mut locations: Vec<SlotLocation> = Vec::new();
        for line in text.lines() {
            let Some(location) = self.parse_line(line) else {
                continue;
            };
            if locations
                .iter()
                .any(|seen| seen.kind == location.kind && seen.index == location.index)
            {
                warn!(
                    "duplicate element in status output, keeping the first: {}",
                    line.trim()
                );
                continue;
            }
            locations.push(location);
        }
        if locations.is_empty() {
            return Err(ChangerError::parse(
                "changer status output contained no recognizable storage elements",
            ));
        }
        // Drives first, then the shared storage/import-export sequence,
        // each ascending. The status output is usually already in this
        // order; sorting makes it a guarantee.
        locations.sort_by_key(|loc| (loc.kind != SlotKind::Drive, loc.index));
        debug!("parsed {} elements from changer status", locations.len());
        Ok(Inventory { locations })
    }

    fn parse_line(&self, line: &str) -> Option<SlotLocation> {
        if let Some(caps) = self.drive_empty.captures(line) {
            return Some(SlotLocation {
                kind: SlotKind::Drive,
                index: caps[1].parse().ok()?,
                full: false,
                volume: None,
                source_slot: None,
            });
        }
        if let Some(caps) = self.drive_full.captures(line) {
            return Some(SlotLocation {
                kind: SlotKind::Drive,
                index: caps[1].parse().ok()?,
                full: true,
                volume: caps.get(3).map(|m| m.as_str().to_string()),
                source_slot: caps.get(2).and_then(|m| m.as_str().parse().ok()),
            });
        }
        if let Some(caps) = self.import_export.captures(line) {
            let full = caps.get(2).is_none();
            return Some(SlotLocation {
                kind: SlotKind::ImportExport,
                index: caps[1].parse().ok()?,
                full,
                volume: caps.get(3).map(|m| m.as_str().to_string()),
                source_slot: None,
            });
        }
        if let Some(caps) = self.storage_empty.captures(line) {
            return Some(SlotLocation {
                kind: SlotKind::Storage,
                index: caps[1].parse().ok()?,
                full: false,
                volume: None,
                source_slot: None,
            });
        }
        if let Some(caps) = self.storage_full.captures(line) {
            return Some(SlotLocation {
                kind: SlotKind::Storage,
                index: caps[1].parse().ok()?,
                full: true,
                volume: caps.get(2).map(|m| m.as_str().to_string()),
                source_slot: None,
            });
        }
        if self.format == StatusFormat::VxaPacketLoader {
            if let Some(caps) = self.packetloader_full.captures(line) {
                return Some(SlotLocation {
                    kind: SlotKind::Storage,
                    index: caps[1].parse().ok()?,
                    full: true,
                    volume: Some(caps[2].to_string()),
                    source_slot: None,
                });
            }
            if let Some(caps) = self.packetloader_empty.captures(line) {
                return Some(SlotLocation {
                    kind: SlotKind::Storage,
                    index: caps[1].parse().ok()?,
                    full: false,
                    volume: None,
                    source_slot: None,
                });
            }
        }
        None
    }
}

/// Immutable snapshot of every library element, rebuilt from a fresh status
/// query each time it is needed. Never cached across the steps of an
/// operation, so a load/unload always re-reads reality before acting.
#[derive(Debug, Clone)]
pub struct Inventory {
    locations: Vec<SlotLocation>,
}

impl Inventory {
    pub fn locations(&self) -> &[SlotLocation] {
        &self.locations
    }

    pub fn drive(&self, index: u32) -> Option<&SlotLocation> {
        self.locations
            .iter()
            .find(|loc| loc.kind == SlotKind::Drive && loc.index == index)
    }

    /// Look up a storage or import/export slot by its one-based index.
    /// Import/export slots are only visible when `include_import_export`
    /// allows them as sources/destinations.
    pub fn slot(&self, index: u32, include_import_export: bool) -> Option<&SlotLocation> {
        self.locations.iter().find(|loc| {
            loc.index == index
                && match loc.kind {
                    SlotKind::Storage => true,
                    SlotKind::ImportExport => include_import_export,
                    SlotKind::Drive => false,
                }
        })
    }

    pub fn drive_count(&self) -> usize {
        self.count_kind(SlotKind::Drive)
    }

    /// Storage slots only; import/export positions are counted separately.
    pub fn storage_slot_count(&self) -> usize {
        self.count_kind(SlotKind::Storage)
    }

    pub fn import_export_count(&self) -> usize {
        self.count_kind(SlotKind::ImportExport)
    }

    fn count_kind(&self, kind: SlotKind) -> usize {
        self.locations.iter().filter(|loc| loc.kind == kind).count()
    }

    /// Occupied cleaning-cartridge slots, identified by label prefix.
    /// Cleaning tapes sitting in drives are ignored: mid-cycle state is
    /// unknowable from the outside.
    pub fn cleaning_tapes(&self, prefix: &str, include_import_export: bool) -> Vec<&SlotLocation> {
        self.locations
            .iter()
            .filter(|loc| {
                loc.full
                    && match loc.kind {
                        SlotKind::Storage => true,
                        SlotKind::ImportExport => include_import_export,
                        SlotKind::Drive => false,
                    }
                    && loc
                        .volume
                        .as_deref()
                        .is_some_and(|vol| vol.starts_with(prefix))
            })
            .collect()
    }
}
