//! Domain types shared by every stage of the equalizer pipeline.
//!
//! Paths stored in snapshots and plans are tree-relative strings using `/` as
//! the separator, regardless of the host platform. They are converted to
//! `PathBuf` only when joined onto a concrete root.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Name of the directory, at the root of the current tree, that receives
/// files removed by a plan.
pub const QUARANTINE_DIR: &str = "ExtraFiles_VersionEqualizer";

// ---------------------------------------------------------------------------
// Digest algorithm
// ---------------------------------------------------------------------------

/// Content digest algorithm used to build a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HashAlgorithm {
    /// 128-bit XXH3. Fast, non-cryptographic.
    #[default]
    #[serde(rename = "xxh3-128")]
    Xxh3,
    /// SHA-256, for callers that want a cryptographic digest.
    #[serde(rename = "sha256")]
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Xxh3 => "xxh3-128",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Length of the hex-encoded digest this algorithm produces.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Xxh3 => 32,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xxh3-128" | "xxh3" => Ok(HashAlgorithm::Xxh3),
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            other => Err(format!(
                "unknown hash algorithm '{other}'; expected: xxh3-128, sha256"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One file's identity within a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "fileName")]
    pub path: String,
    #[serde(rename = "hash")]
    pub digest: String,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            digest: digest.into(),
        }
    }
}

/// Content-hash inventory of a directory tree.
///
/// Records keep discovery order so that serialization is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// `None` only for snapshot files written without an algorithm tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<HashAlgorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

impl Snapshot {
    /// An empty snapshot stamped with `algorithm` and the current time.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm: Some(algorithm),
            created_at: Some(Utc::now()),
            files: Vec::new(),
        }
    }

    pub fn with_files(algorithm: HashAlgorithm, files: Vec<FileRecord>) -> Self {
        Self {
            files,
            ..Self::new(algorithm)
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Check that every path is a safe relative path and appears only once.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::with_capacity(self.files.len());
        for record in &self.files {
            validate_relative_path(&record.path)?;
            if !seen.insert(record.path.as_str()) {
                return Err(CoreError::DuplicatePath {
                    path: record.path.clone(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// What the equalizer must do with one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Copy the target's bytes into the current tree.
    #[serde(rename = "copy")]
    AddOrUpdate,
    /// Move the current tree's file into quarantine.
    #[serde(rename = "move")]
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::AddOrUpdate => write!(f, "copy"),
            Action::Remove => write!(f, "move"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    #[serde(rename = "filename")]
    pub path: String,
    #[serde(rename = "status")]
    pub action: Action,
}

impl PlanEntry {
    pub fn add_or_update(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: Action::AddOrUpdate,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: Action::Remove,
        }
    }
}

/// Per-path actions that bring a current tree in line with a target tree.
///
/// Serialized as a bare JSON array of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn new(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn additions(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|e| e.action == Action::AddOrUpdate)
    }

    pub fn removals(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.action == Action::Remove)
    }

    pub fn has_additions(&self) -> bool {
        self.additions().next().is_some()
    }

    /// Check that every path is a safe relative path and appears only once.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            validate_relative_path(&entry.path)?;
            if !seen.insert(entry.path.as_str()) {
                return Err(CoreError::DuplicatePath {
                    path: entry.path.clone(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Batch bookkeeping
// ---------------------------------------------------------------------------

/// A single item a batch operation could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub path: String,
    pub reason: String,
}

impl SkippedItem {
    pub fn new(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Relative path helpers
// ---------------------------------------------------------------------------

/// Reject paths that are empty, absolute, or that step outside their root.
pub fn validate_relative_path(path: &str) -> Result<(), CoreError> {
    let invalid = |reason: &'static str| CoreError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.contains('\0') {
        return Err(invalid("path contains a NUL byte"));
    }
    if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
        return Err(invalid("path is absolute"));
    }
    for component in path.split('/') {
        match component {
            "" => return Err(invalid("path has an empty component")),
            "." | ".." => return Err(invalid("path contains a relative component")),
            _ => {}
        }
    }
    Ok(())
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Join a `/`-separated relative path onto `root` using native separators.
pub fn join_relative(root: &Path, relative: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for component in relative.split('/') {
        out.push(component);
    }
    out
}

/// True if `relative` is the quarantine directory or lies beneath it.
pub fn is_quarantined(relative: &str) -> bool {
    relative == QUARANTINE_DIR
        || relative
            .strip_prefix(QUARANTINE_DIR)
            .is_some_and(|rest| rest.starts_with('/'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_with_external_field_names() {
        let snapshot = Snapshot {
            algorithm: Some(HashAlgorithm::Xxh3),
            created_at: None,
            files: vec![FileRecord::new("bin/app.exe", "00ff")],
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["algorithm"], "xxh3-128");
        assert_eq!(json["files"][0]["fileName"], "bin/app.exe");
        assert_eq!(json["files"][0]["hash"], "00ff");
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn snapshot_without_algorithm_parses() {
        let snapshot: Snapshot =
            serde_json::from_str(r#"{"files":[{"fileName":"a.txt","hash":"ab"}]}"#).unwrap();
        assert_eq!(snapshot.algorithm, None);
        assert_eq!(snapshot.files, vec![FileRecord::new("a.txt", "ab")]);
    }

    #[test]
    fn plan_is_a_bare_array_of_copy_and_move() {
        let plan = Plan::new(vec![
            PlanEntry::add_or_update("a.txt"),
            PlanEntry::remove("b.txt"),
        ]);
        let json = serde_json::to_string(&plan).unwrap();
        assert_eq!(
            json,
            r#"[{"filename":"a.txt","status":"copy"},{"filename":"b.txt","status":"move"}]"#
        );
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn plan_validate_rejects_duplicate_paths() {
        let plan = Plan::new(vec![
            PlanEntry::add_or_update("a.txt"),
            PlanEntry::remove("a.txt"),
        ]);
        assert!(matches!(
            plan.validate(),
            Err(CoreError::DuplicatePath { path }) if path == "a.txt"
        ));
    }

    #[test]
    fn snapshot_validate_rejects_duplicate_paths() {
        let snapshot = Snapshot::with_files(
            HashAlgorithm::Xxh3,
            vec![FileRecord::new("x", "1"), FileRecord::new("x", "2")],
        );
        assert!(matches!(
            snapshot.validate(),
            Err(CoreError::DuplicatePath { .. })
        ));
    }

    #[test]
    fn relative_path_validation() {
        assert!(validate_relative_path("a/b/c.txt").is_ok());
        assert!(validate_relative_path(".hidden/file").is_ok());
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("C:/Windows").is_err());
        assert!(validate_relative_path("a/../../b").is_err());
        assert!(validate_relative_path("a//b").is_err());
        assert!(validate_relative_path("./a").is_err());
    }

    #[test]
    fn quarantine_prefix_matches_whole_component_only() {
        assert!(is_quarantined("ExtraFiles_VersionEqualizer"));
        assert!(is_quarantined("ExtraFiles_VersionEqualizer/a.txt"));
        assert!(!is_quarantined("ExtraFiles_VersionEqualizerX/a.txt"));
        assert!(!is_quarantined("sub/ExtraFiles_VersionEqualizer/a.txt"));
    }

    #[test]
    fn join_relative_uses_native_components() {
        let joined = join_relative(Path::new("/root"), "a/b/c.txt");
        assert_eq!(joined, Path::new("/root").join("a").join("b").join("c.txt"));
    }

    #[test]
    fn hash_algorithm_parses_aliases() {
        assert_eq!("XXH3".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Xxh3));
        assert_eq!("sha-256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
