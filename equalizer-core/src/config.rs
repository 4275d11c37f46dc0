//! Equalizer configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.equalizer/
//!   config.yaml
//! ```
//!
//! Every loader has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::HashAlgorithm;

/// Smallest accepted read buffer.
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Default read buffer for hashing and archive copies.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// How file bytes are stored inside the payload archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

/// Tunables shared by the scan, pack and equalize stages.
///
/// Both trees of a comparison must be scanned with the same scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerConfig {
    pub hash_algorithm: HashAlgorithm,
    pub chunk_size: usize,
    pub follow_symlinks: bool,
    pub include_hidden: bool,
    pub parallel_hashing: bool,
    pub compression: Compression,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            follow_symlinks: false,
            include_hidden: true,
            parallel_hashing: true,
            compression: Compression::default(),
        }
    }
}

impl EqualizerConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(CoreError::InvalidConfig(format!(
                "chunk_size must be at least {MIN_CHUNK_SIZE} bytes (got {})",
                self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, CoreError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// `<home>/.equalizer/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".equalizer").join("config.yaml")
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, CoreError> {
    Ok(config_path_at(&home()?))
}

/// Load `<home>/.equalizer/config.yaml`, falling back to defaults when the
/// file does not exist.
pub fn load_at(home: &Path) -> Result<EqualizerConfig, CoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(EqualizerConfig::default());
    }
    load_from(&path)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<EqualizerConfig, CoreError> {
    load_at(&home()?)
}

/// Load an explicit config file. A missing file is an error here.
pub fn load_from(path: &Path) -> Result<EqualizerConfig, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: EqualizerConfig =
        serde_yaml::from_str(&contents).map_err(|source| CoreError::Config {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(home: &Path, yaml: &str) {
        let path = config_path_at(home);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, yaml).unwrap();
    }

    #[test]
    fn defaults_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let config = load_at(tmp.path()).unwrap();
        assert_eq!(config, EqualizerConfig::default());
        assert_eq!(config.hash_algorithm, HashAlgorithm::Xxh3);
        assert!(!config.follow_symlinks);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "hash_algorithm: sha256\ninclude_hidden: false\n");
        let config = load_at(tmp.path()).unwrap();
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert!(!config.include_hidden);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.compression, Compression::Deflated);
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "chunk_size: [not, a, number]\n");
        match load_at(tmp.path()).unwrap_err() {
            CoreError::Config { path, .. } => assert_eq!(path, config_path_at(tmp.path())),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn tiny_chunk_size_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "chunk_size: 16\n");
        assert!(matches!(
            load_at(tmp.path()),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_from(&tmp.path().join("absent.yaml")),
            Err(CoreError::Io { .. })
        ));
    }

    #[test]
    fn yaml_dump_roundtrips() {
        let config = EqualizerConfig {
            compression: Compression::Stored,
            ..EqualizerConfig::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("compression: stored"));
        assert!(yaml.contains("hash_algorithm: xxh3-128"));
        let back: EqualizerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
