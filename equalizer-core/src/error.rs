//! Error types for equalizer-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::Operation;

/// All errors that can arise from loading, saving or validating core data.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed snapshot or plan JSON.
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (write path).
    #[error("JSON serialization error: {0}")]
    JsonSerialize(#[source] serde_json::Error),

    /// Malformed config YAML.
    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization error (config dump).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A config value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.equalizer/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A snapshot or plan path that cannot be safely joined onto a root.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// The same path appears twice in one snapshot or plan.
    #[error("duplicate path '{path}'")]
    DuplicatePath { path: String },

    /// A session was asked for a request before all inputs were supplied.
    #[error("cannot start {operation}: missing {}", missing.join(", "))]
    SessionIncomplete {
        operation: Operation,
        missing: Vec<&'static str>,
    },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
