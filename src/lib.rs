//! mtx-changer library
//!
//! Controls a robotic tape-library changer on behalf of a backup
//! scheduler: inventory queries, load/unload/transfer orchestration with
//! bounded readiness polling, and an optional automatic drive-cleaning
//! cycle. All physical control is delegated to the standard command-line
//! tools (mtx, mt, tapeinfo); this crate interprets their textual output.

pub mod changer;
pub mod clean;
pub mod cli;
pub mod config;
pub mod drive;
pub mod error;
pub mod exec;
pub mod inventory;
pub mod logger;

// Re-export key types for easier use
pub use changer::Changer;
pub use cli::{Cli, MtxCommand, OperationRequest};
pub use config::ChangerConfig;
pub use drive::{CleaningSignal, DriveReadiness};
pub use error::{ChangerError, Result};
pub use exec::{CmdOutput, CommandRunner, SystemRunner};
pub use inventory::{Inventory, SlotKind, SlotLocation, StatusFormat, StatusParser};
