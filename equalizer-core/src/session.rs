//! Input aggregation for a single pipeline operation.
//!
//! A front end fills a [`SyncSession`] as the user picks folders and files,
//! asks [`SyncSession::is_ready`] before enabling an action, and turns the
//! session into a typed [`Request`] with [`SyncSession::request`].

use std::fmt;
use std::path::PathBuf;

use crate::error::CoreError;
use crate::types::{Plan, Snapshot};

/// The operations a session can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Scan,
    Diff,
    Pack,
    Equalize,
    Verify,
}

impl Operation {
    pub fn all() -> &'static [Operation] {
        &[
            Operation::Scan,
            Operation::Diff,
            Operation::Pack,
            Operation::Equalize,
            Operation::Verify,
        ]
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Scan => write!(f, "scan"),
            Operation::Diff => write!(f, "diff"),
            Operation::Pack => write!(f, "pack"),
            Operation::Equalize => write!(f, "equalize"),
            Operation::Verify => write!(f, "verify"),
        }
    }
}

/// Fully specified input for one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Snapshot the tree at `root`.
    Scan { root: PathBuf },
    /// Compute the plan that turns `current` into `target`.
    Diff { target: Snapshot, current: Snapshot },
    /// Package the plan's additions from `target_root` into `archive`.
    Pack {
        plan: Plan,
        target_root: PathBuf,
        archive: PathBuf,
    },
    /// Apply `plan` to `current_root` using the payload in `archive`.
    Equalize {
        plan: Plan,
        current_root: PathBuf,
        archive: Option<PathBuf>,
        dry_run: bool,
    },
    /// Scan `current_root` and compare it with `target`.
    Verify {
        target: Snapshot,
        current_root: PathBuf,
    },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::Scan { .. } => Operation::Scan,
            Request::Diff { .. } => Operation::Diff,
            Request::Pack { .. } => Operation::Pack,
            Request::Equalize { .. } => Operation::Equalize,
            Request::Verify { .. } => Operation::Verify,
        }
    }
}

/// Inputs collected so far. Fields are filled independently and in any order.
#[derive(Debug, Clone, Default)]
pub struct SyncSession {
    pub scan_root: Option<PathBuf>,
    pub target_root: Option<PathBuf>,
    pub current_root: Option<PathBuf>,
    pub target_snapshot: Option<Snapshot>,
    pub current_snapshot: Option<Snapshot>,
    pub plan: Option<Plan>,
    /// Output path for `Pack`, input path for `Equalize`.
    pub archive: Option<PathBuf>,
    pub dry_run: bool,
}

impl SyncSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the inputs `operation` still needs.
    pub fn missing(&self, operation: Operation) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let mut need = |present: bool, name: &'static str| {
            if !present {
                missing.push(name);
            }
        };
        match operation {
            Operation::Scan => need(self.scan_root.is_some(), "scan root"),
            Operation::Diff => {
                need(self.target_snapshot.is_some(), "target snapshot");
                need(self.current_snapshot.is_some(), "current snapshot");
            }
            Operation::Pack => {
                need(self.plan.is_some(), "plan");
                need(self.target_root.is_some(), "target root");
                need(self.archive.is_some(), "archive path");
            }
            Operation::Equalize => {
                need(self.plan.is_some(), "plan");
                need(self.current_root.is_some(), "current root");
                // A plan made only of removals needs no payload.
                let needs_archive = self.plan.as_ref().is_some_and(Plan::has_additions);
                need(!needs_archive || self.archive.is_some(), "archive path");
            }
            Operation::Verify => {
                need(self.target_snapshot.is_some(), "target snapshot");
                need(self.current_root.is_some(), "current root");
            }
        }
        missing
    }

    pub fn is_ready(&self, operation: Operation) -> bool {
        self.missing(operation).is_empty()
    }

    /// Build the request for `operation`, or report which inputs are missing.
    pub fn request(&self, operation: Operation) -> Result<Request, CoreError> {
        let missing = self.missing(operation);
        if !missing.is_empty() {
            return Err(CoreError::SessionIncomplete { operation, missing });
        }
        let incomplete = || CoreError::SessionIncomplete {
            operation,
            missing: Vec::new(),
        };

        let request = match operation {
            Operation::Scan => Request::Scan {
                root: self.scan_root.clone().ok_or_else(incomplete)?,
            },
            Operation::Diff => Request::Diff {
                target: self.target_snapshot.clone().ok_or_else(incomplete)?,
                current: self.current_snapshot.clone().ok_or_else(incomplete)?,
            },
            Operation::Pack => Request::Pack {
                plan: self.plan.clone().ok_or_else(incomplete)?,
                target_root: self.target_root.clone().ok_or_else(incomplete)?,
                archive: self.archive.clone().ok_or_else(incomplete)?,
            },
            Operation::Equalize => Request::Equalize {
                plan: self.plan.clone().ok_or_else(incomplete)?,
                current_root: self.current_root.clone().ok_or_else(incomplete)?,
                archive: self.archive.clone(),
                dry_run: self.dry_run,
            },
            Operation::Verify => Request::Verify {
                target: self.target_snapshot.clone().ok_or_else(incomplete)?,
                current_root: self.current_root.clone().ok_or_else(incomplete)?,
            },
        };
        Ok(request)
    }
}
