//! # equalizer-sync
//!
//! Directory-tree reconciliation: hash a tree into a snapshot, diff two
//! snapshots into a plan, package the files a plan needs, and apply the plan
//! to a live tree.
//!
//! Front ends normally go through [`pipeline::run`] or [`pipeline::spawn`],
//! which dispatch a [`equalizer_core::Request`] and report progress to an
//! [`Observer`].

pub mod diff;
pub mod equalize;
pub mod error;
pub mod hash;
pub mod pack;
pub mod pipeline;
pub mod progress;
pub mod scan;

pub use diff::diff;
pub use equalize::{equalize, AdditionResult, EqualizeOptions, EqualizeReport, RemovalResult};
pub use error::{EqualizeStep, Side, StepFailure, SyncError};
pub use hash::{hash_bytes, hash_file, hash_reader};
pub use pack::{pack, PackOptions, PackOutcome, PackReport};
pub use pipeline::{run, spawn, verify, Output, VerifyReport, Worker};
pub use progress::{Event, FnObserver, NoopObserver, Observer, Outcome};
pub use scan::{scan, ScanOptions, ScanReport};
