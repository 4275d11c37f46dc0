//! Equalizer core library: domain types, snapshot/plan files, config, errors.
//!
//! Public API surface:
//! - [`types`]: snapshots, plans and path helpers
//! - [`files`]: atomic JSON load / save for snapshots and plans
//! - [`config`]: `~/.equalizer/config.yaml`
//! - [`session`]: [`SyncSession`] input aggregation
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod files;
pub mod session;
pub mod types;

pub use config::{Compression, EqualizerConfig};
pub use error::CoreError;
pub use session::{Operation, Request, SyncSession};
pub use types::{
    Action, FileRecord, HashAlgorithm, Plan, PlanEntry, SkippedItem, Snapshot, QUARANTINE_DIR,
};
