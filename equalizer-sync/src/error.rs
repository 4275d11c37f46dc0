//! Error types for equalizer-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use equalizer_core::{CoreError, HashAlgorithm};

use crate::equalize::EqualizeReport;

/// Which side of a comparison an input belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Target,
    Current,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Target => write!(f, "target"),
            Side::Current => write!(f, "current"),
        }
    }
}

/// The two halves of an equalize run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualizeStep {
    Quarantine,
    Materialize,
}

impl fmt::Display for EqualizeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EqualizeStep::Quarantine => write!(f, "quarantine removals"),
            EqualizeStep::Materialize => write!(f, "materialize additions"),
        }
    }
}

/// A fatal error raised by one equalize step.
#[derive(Debug)]
pub struct StepFailure {
    pub step: EqualizeStep,
    pub error: SyncError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the core crate (file formats, validation, config).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A root directory passed to an operation does not exist.
    #[error("root directory not found: {path}")]
    RootNotFound { path: PathBuf },

    /// A root passed to an operation exists but is not a directory.
    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// A snapshot handed to the differ failed validation.
    #[error("invalid {side} snapshot: {source}")]
    InvalidSnapshot {
        side: Side,
        #[source]
        source: CoreError,
    },

    /// The two snapshots were hashed with different algorithms.
    #[error("snapshots are not comparable: target uses {}, current uses {}", label(.target), label(.current))]
    AlgorithmMismatch {
        target: Option<HashAlgorithm>,
        current: Option<HashAlgorithm>,
    },

    /// The payload archive could not be read or written.
    #[error("archive error at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// An archive entry name that would land outside the current root.
    #[error("unsafe archive entry '{name}'")]
    UnsafeArchiveEntry { name: String },

    /// Something other than a regular file occupies a path the plan writes.
    #[error("path collision at {path}: {reason}")]
    PathCollision { path: PathBuf, reason: &'static str },

    /// One or both equalize steps failed. The partial report describes what
    /// was done before the failures.
    #[error("equalize failed: {}", join_failures(.failures))]
    Equalize {
        failures: Vec<StepFailure>,
        report: Box<EqualizeReport>,
    },

    /// The worker thread running an operation panicked.
    #[error("{operation} worker panicked")]
    WorkerPanicked { operation: String },
}

fn label(algorithm: &Option<HashAlgorithm>) -> String {
    algorithm
        .map(|a| a.to_string())
        .unwrap_or_else(|| "an unspecified algorithm".to_string())
}

fn join_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Archive`].
pub(crate) fn zip_err(path: impl Into<PathBuf>, source: zip::result::ZipError) -> SyncError {
    SyncError::Archive {
        path: path.into(),
        source,
    }
}

/// Fail unless `path` is an existing directory.
pub(crate) fn require_dir(path: &std::path::Path) -> Result<(), SyncError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SyncError::NotADirectory {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SyncError::RootNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(io_err(path, e)),
    }
}
