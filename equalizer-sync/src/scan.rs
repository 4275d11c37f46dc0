//! Tree snapshotting.
//!
//! Walk policy, applied the same way to every tree:
//! - entries are visited in file-name order, so snapshots are deterministic;
//! - only regular files are recorded; symlinks are not followed unless
//!   [`ScanOptions::follow_symlinks`] is set, and other special files are
//!   ignored;
//! - the quarantine directory at the root is never entered;
//! - dot-files are included unless [`ScanOptions::include_hidden`] is off;
//! - `*.equalizer.tmp` files are ignored: they are leftovers of an interrupted
//!   extraction, never content.
//!
//! A file that cannot be read is recorded in [`ScanReport::skipped`] and the
//! scan carries on with the rest of the tree.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use equalizer_core::{
    EqualizerConfig, FileRecord, HashAlgorithm, SkippedItem, Snapshot, QUARANTINE_DIR,
};

use crate::equalize::TMP_SUFFIX;
use crate::error::{require_dir, SyncError};
use crate::hash::hash_file;
use crate::progress::{progress, status, Observer};

/// Settings that control how a tree is walked and hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub algorithm: HashAlgorithm,
    pub chunk_size: usize,
    pub follow_symlinks: bool,
    pub include_hidden: bool,
    pub parallel: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&EqualizerConfig::default())
    }
}

impl From<&EqualizerConfig> for ScanOptions {
    fn from(config: &EqualizerConfig) -> Self {
        Self {
            algorithm: config.hash_algorithm,
            chunk_size: config.chunk_size,
            follow_symlinks: config.follow_symlinks,
            include_hidden: config.include_hidden,
            parallel: config.parallel_hashing,
        }
    }
}

/// A snapshot plus the entries that could not be recorded.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub snapshot: Snapshot,
    pub skipped: Vec<SkippedItem>,
}

#[derive(Debug)]
struct Candidate {
    relative: String,
    absolute: PathBuf,
}

/// Snapshot every regular file under `root`.
pub fn scan(
    root: &Path,
    options: &ScanOptions,
    observer: &dyn Observer,
) -> Result<ScanReport, SyncError> {
    require_dir(root)?;

    let mut skipped = Vec::new();
    let candidates = enumerate(root, options, &mut skipped);
    status(
        observer,
        format!("hashing {} files under {}", candidates.len(), root.display()),
    );

    let mut files = Vec::with_capacity(candidates.len());
    for result in hash_candidates(&candidates, options, observer) {
        match result {
            Ok(record) => files.push(record),
            Err(item) => skipped.push(item),
        }
    }

    for item in &skipped {
        tracing::warn!(path = %item.path, reason = %item.reason, "skipped during scan");
        status(observer, format!("skipped {}: {}", item.path, item.reason));
    }
    tracing::info!(
        root = %root.display(),
        files = files.len(),
        skipped = skipped.len(),
        "scan complete"
    );

    Ok(ScanReport {
        snapshot: Snapshot::with_files(options.algorithm, files),
        skipped,
    })
}

fn enumerate(root: &Path, options: &ScanOptions, skipped: &mut Vec<SkippedItem>) -> Vec<Candidate> {
    let include_hidden = options.include_hidden;
    let walker = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| keep_entry(entry, include_hidden));

    let mut candidates = Vec::new();
    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| display_relative(root, p))
                    .unwrap_or_default();
                let reason = match err.io_error() {
                    Some(io) => io.to_string(),
                    None => err.to_string(),
                };
                skipped.push(SkippedItem::new(path, reason));
                continue;
            }
        };

        let file_type = entry.file_type();
        if !file_type.is_file() {
            if !file_type.is_dir() {
                tracing::debug!(path = %entry.path().display(), "ignoring non-regular file");
            }
            continue;
        }

        match relative_path(root, entry.path()) {
            Ok(relative) => candidates.push(Candidate {
                relative,
                absolute: entry.into_path(),
            }),
            Err(reason) => skipped.push(SkippedItem::new(
                display_relative(root, entry.path()),
                reason,
            )),
        }
    }
    candidates
}

fn keep_entry(entry: &DirEntry, include_hidden: bool) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    if entry.depth() == 1 && entry.file_name() == QUARANTINE_DIR {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if !include_hidden && name.starts_with('.') {
        return false;
    }
    !(entry.file_type().is_file() && name.ends_with(TMP_SUFFIX))
}

fn hash_candidates(
    candidates: &[Candidate],
    options: &ScanOptions,
    observer: &dyn Observer,
) -> Vec<Result<FileRecord, SkippedItem>> {
    let total = candidates.len();
    let done = AtomicUsize::new(0);

    let hash_one = |candidate: &Candidate| {
        tracing::debug!(path = %candidate.relative, "hashing");
        let result = hash_file(&candidate.absolute, options.algorithm, options.chunk_size)
            .map(|digest| FileRecord::new(candidate.relative.clone(), digest))
            .map_err(|err| SkippedItem::new(candidate.relative.clone(), skip_reason(err)));
        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        progress(observer, n, total, &candidate.relative);
        result
    };

    // Both paths preserve candidate order.
    if options.parallel {
        candidates.par_iter().map(&hash_one).collect()
    } else {
        candidates.iter().map(&hash_one).collect()
    }
}

fn skip_reason(err: SyncError) -> String {
    match err {
        SyncError::Io { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// `root`-relative path joined with `/`. Fails on non-UTF-8 components.
pub(crate) fn relative_path(root: &Path, path: &Path) -> Result<String, &'static str> {
    let stripped = path
        .strip_prefix(root)
        .map_err(|_| "path is outside the scanned root")?;
    let mut parts = Vec::new();
    for component in stripped.components() {
        match component {
            Component::Normal(part) => {
                parts.push(part.to_str().ok_or("path is not valid UTF-8")?);
            }
            Component::CurDir => {}
            _ => return Err("path has an unexpected component"),
        }
    }
    if parts.is_empty() {
        return Err("path is the scanned root");
    }
    Ok(parts.join("/"))
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{Event, NoopObserver};
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn paths(report: &ScanReport) -> Vec<&str> {
        report
            .snapshot
            .files
            .iter()
            .map(|f| f.path.as_str())
            .collect()
    }

    fn sequential() -> ScanOptions {
        ScanOptions {
            parallel: false,
            ..ScanOptions::default()
        }
    }

    #[test]
    fn nested_tree_uses_forward_slashes_in_name_order() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b.txt", "b");
        write(tmp.path(), "a/z.txt", "z");
        write(tmp.path(), "a/deep/c.txt", "c");

        let report = scan(tmp.path(), &sequential(), &NoopObserver).unwrap();
        assert_eq!(paths(&report), vec!["a/deep/c.txt", "a/z.txt", "b.txt"]);
        assert!(report.skipped.is_empty());
        assert_eq!(report.snapshot.algorithm, Some(HashAlgorithm::Xxh3));
    }

    #[test]
    fn empty_tree_gives_empty_snapshot() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("only/dirs/here")).unwrap();
        let report = scan(tmp.path(), &sequential(), &NoopObserver).unwrap();
        assert!(report.snapshot.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn missing_root_is_an_input_error() {
        let tmp = TempDir::new().unwrap();
        let err = scan(&tmp.path().join("nope"), &sequential(), &NoopObserver).unwrap_err();
        assert!(matches!(err, SyncError::RootNotFound { .. }));
    }

    #[test]
    fn file_root_is_an_input_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "file.txt", "x");
        let err = scan(&tmp.path().join("file.txt"), &sequential(), &NoopObserver).unwrap_err();
        assert!(matches!(err, SyncError::NotADirectory { .. }));
    }

    #[test]
    fn quarantine_directory_is_not_scanned() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "keep.txt", "k");
        write(tmp.path(), &format!("{QUARANTINE_DIR}/old.txt"), "o");
        write(tmp.path(), &format!("sub/{QUARANTINE_DIR}/nested.txt"), "n");

        let report = scan(tmp.path(), &sequential(), &NoopObserver).unwrap();
        assert_eq!(
            paths(&report),
            vec!["keep.txt", "sub/ExtraFiles_VersionEqualizer/nested.txt"]
        );
    }

    #[test]
    fn hidden_entries_follow_option() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), ".env", "secret");
        write(tmp.path(), ".cache/blob", "b");
        write(tmp.path(), "visible.txt", "v");

        let with_hidden = scan(tmp.path(), &sequential(), &NoopObserver).unwrap();
        assert_eq!(paths(&with_hidden), vec![".cache/blob", ".env", "visible.txt"]);

        let options = ScanOptions {
            include_hidden: false,
            ..sequential()
        };
        let without = scan(tmp.path(), &options, &NoopObserver).unwrap();
        assert_eq!(paths(&without), vec!["visible.txt"]);
    }

    #[test]
    fn parallel_and_sequential_scans_agree() {
        let tmp = TempDir::new().unwrap();
        for i in 0..40 {
            write(tmp.path(), &format!("d{}/f{i}.bin", i % 5), &"x".repeat(i * 100));
        }
        let seq = scan(tmp.path(), &sequential(), &NoopObserver).unwrap();
        let par = scan(
            tmp.path(),
            &ScanOptions {
                parallel: true,
                ..sequential()
            },
            &NoopObserver,
        )
        .unwrap();
        assert_eq!(seq.snapshot.files, par.snapshot.files);
    }

    #[test]
    fn vanished_file_is_skipped_and_others_kept() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "present.txt", "here");
        let candidates = vec![
            Candidate {
                relative: "present.txt".into(),
                absolute: tmp.path().join("present.txt"),
            },
            Candidate {
                relative: "vanished.txt".into(),
                absolute: tmp.path().join("vanished.txt"),
            },
        ];

        let results = hash_candidates(&candidates, &sequential(), &NoopObserver);
        assert!(results[0].is_ok());
        let skipped = results[1].as_ref().unwrap_err();
        assert_eq!(skipped.path, "vanished.txt");
        assert!(!skipped.reason.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_file_is_skipped_by_scan() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", "a");
        write(tmp.path(), "locked.txt", "secret");
        write(tmp.path(), "z/b.txt", "b");
        let locked = tmp.path().join("locked.txt");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::File::open(&locked).is_ok() {
            // Privileged users read through mode 000.
            return;
        }

        let report = scan(tmp.path(), &ScanOptions::default(), &NoopObserver).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(paths(&report), vec!["a.txt", "z/b.txt"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, "locked.txt");
        assert!(!report.skipped[0].reason.is_empty());
    }

    #[test]
    fn leftover_extraction_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", "a");
        write(tmp.path(), "a.txt.equalizer.tmp", "partial");
        write(tmp.path(), "dir/b.bin.equalizer.tmp", "partial");

        let report = scan(tmp.path(), &sequential(), &NoopObserver).unwrap();
        assert_eq!(paths(&report), vec!["a.txt"]);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn progress_reaches_one_hundred() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a", "1");
        write(tmp.path(), "b", "2");
        let (tx, rx) = mpsc::channel();
        scan(tmp.path(), &sequential(), &tx).unwrap();
        drop(tx);
        let last = rx
            .iter()
            .filter_map(|e| match e {
                Event::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .last();
        assert_eq!(last, Some(100));
    }

    #[test]
    #[cfg(unix)]
    fn symlinks_are_ignored_unless_followed() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "real.txt", "data");
        std::os::unix::fs::symlink(tmp.path().join("real.txt"), tmp.path().join("link.txt"))
            .unwrap();

        let report = scan(tmp.path(), &sequential(), &NoopObserver).unwrap();
        assert_eq!(paths(&report), vec!["real.txt"]);

        let followed = scan(
            tmp.path(),
            &ScanOptions {
                follow_symlinks: true,
                ..sequential()
            },
            &NoopObserver,
        )
        .unwrap();
        assert_eq!(paths(&followed), vec!["link.txt", "real.txt"]);
        assert_eq!(
            followed.snapshot.files[0].digest,
            followed.snapshot.files[1].digest
        );
    }

    #[test]
    #[cfg(unix)]
    fn broken_followed_symlink_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "ok.txt", "fine");
        std::os::unix::fs::symlink(tmp.path().join("missing"), tmp.path().join("dangling"))
            .unwrap();

        let options = ScanOptions {
            follow_symlinks: true,
            ..sequential()
        };
        let report = scan(tmp.path(), &options, &NoopObserver).unwrap();
        assert_eq!(paths(&report), vec!["ok.txt"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, "dangling");
    }

    #[test]
    fn relative_path_joins_components() {
        let root = Path::new("/data/root");
        assert_eq!(
            relative_path(root, &root.join("a").join("b.txt")),
            Ok("a/b.txt".to_string())
        );
        assert!(relative_path(root, root).is_err());
        assert!(relative_path(root, Path::new("/elsewhere/x")).is_err());
    }
}
