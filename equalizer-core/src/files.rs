//! Snapshot and plan files.
//!
//! Both are UTF-8 JSON documents. Saves are atomic: the document is written
//! to a `.tmp` sibling in the same directory and then renamed over the final
//! path, so a reader never observes a half-written file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, CoreError};
use crate::types::{Plan, Snapshot};

/// Load a snapshot file and validate its paths.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, CoreError> {
    let snapshot: Snapshot = load_json(path)?;
    snapshot.validate()?;
    Ok(snapshot)
}

/// Save a snapshot file atomically (pretty-printed).
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), CoreError> {
    save_json(path, snapshot)
}

/// Load a plan file and validate its paths.
pub fn load_plan(path: &Path) -> Result<Plan, CoreError> {
    let plan: Plan = load_json(path)?;
    plan.validate()?;
    Ok(plan)
}

/// Save a plan file atomically (pretty-printed).
pub fn save_plan(path: &Path, plan: &Plan) -> Result<(), CoreError> {
    save_json(path, plan)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&contents).map_err(|source| CoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    let mut json = serde_json::to_string_pretty(value).map_err(CoreError::JsonSerialize)?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
}

/// `<dir>/<file_name>.tmp`: always beside the target so the rename stays on
/// one filesystem.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.tmp"))
}

/// Write `contents` to `path` via a `.tmp` sibling and rename.
///
/// Creates missing parent directories. On rename failure the `.tmp` file is
/// removed and the original (if any) is left intact.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = tmp_sibling(path);
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileRecord, HashAlgorithm, PlanEntry};
    use tempfile::TempDir;

    #[test]
    fn snapshot_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("target.json");
        let snapshot = Snapshot::with_files(
            HashAlgorithm::Xxh3,
            vec![
                FileRecord::new("a.txt", "0123456789abcdef0123456789abcdef"),
                FileRecord::new("dir/b.bin", "fedcba9876543210fedcba9876543210"),
            ],
        );
        save_snapshot(&path, &snapshot).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn plan_roundtrip_in_nested_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("plan.json");
        let plan = Plan::new(vec![
            PlanEntry::add_or_update("a.txt"),
            PlanEntry::remove("old/b.txt"),
        ]);
        save_plan(&path, &plan).unwrap();
        assert_eq!(load_plan(&path).unwrap(), plan);
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        save_plan(&path, &Plan::default()).unwrap();
        assert!(path.exists());
        assert!(!tmp_sibling(&path).exists(), "tmp file should be renamed away");
    }

    #[test]
    fn malformed_json_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_snapshot(&path).unwrap_err();
        match err {
            CoreError::Json { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected Json error, got {other:?}"),
        }
    }

    #[test]
    fn load_plan_rejects_escaping_paths() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        std::fs::write(&path, r#"[{"filename":"../outside.txt","status":"move"}]"#).unwrap();
        assert!(matches!(
            load_plan(&path),
            Err(CoreError::InvalidPath { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_plan(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
