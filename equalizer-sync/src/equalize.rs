//! Plan application.
//!
//! Two steps, both always attempted:
//!
//! 1. **Quarantine removals**: each REMOVE path that still exists is renamed
//!    to `ExtraFiles_VersionEqualizer/<path>`. An occupied destination gets a
//!    `.1`, `.2`, … suffix. Directories emptied by a move are pruned.
//! 2. **Materialize additions**: each archive entry the plan marks
//!    ADD_OR_UPDATE is written to `<path>.equalizer.tmp`, hashed on the way,
//!    and renamed over `<path>` unless the existing file already matches.
//!
//! Removals run first so a path that turns from a file into a directory (or
//! back) is free before extraction. Nothing is ever deleted: the only
//! destructive-looking operation is a rename into quarantine.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use zip::ZipArchive;

use equalizer_core::{
    types::{is_quarantined, join_relative, validate_relative_path},
    CoreError, EqualizerConfig, HashAlgorithm, Plan, QUARANTINE_DIR,
};

use crate::error::{io_err, require_dir, zip_err, EqualizeStep, StepFailure, SyncError};
use crate::hash::{hash_file, hash_reader, HashingWriter};
use crate::pack::{copy_chunked, CopyFailure};
use crate::progress::{progress, status, Observer};

pub(crate) const TMP_SUFFIX: &str = ".equalizer.tmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualizeOptions {
    pub algorithm: HashAlgorithm,
    pub chunk_size: usize,
    /// Report what would happen without touching the tree.
    pub dry_run: bool,
}

impl Default for EqualizeOptions {
    fn default() -> Self {
        Self::from(&EqualizerConfig::default())
    }
}

impl From<&EqualizerConfig> for EqualizeOptions {
    fn from(config: &EqualizerConfig) -> Self {
        Self {
            algorithm: config.hash_algorithm,
            chunk_size: config.chunk_size,
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of materializing one ADD_OR_UPDATE path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdditionResult {
    /// New content was written.
    Written { path: String },
    /// The file already held the archived content.
    Unchanged { path: String },
    /// Dry run: the file would have been written.
    WouldWrite { path: String },
}

impl AdditionResult {
    pub fn path(&self) -> &str {
        match self {
            AdditionResult::Written { path }
            | AdditionResult::Unchanged { path }
            | AdditionResult::WouldWrite { path } => path,
        }
    }
}

/// Outcome of one REMOVE path. `destination` is relative to the current root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RemovalResult {
    Quarantined { path: String, destination: String },
    WouldQuarantine { path: String, destination: String },
    /// Nothing at `path`; the desired end state already holds.
    AlreadyAbsent { path: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EqualizeReport {
    pub dry_run: bool,
    pub additions: Vec<AdditionResult>,
    pub removals: Vec<RemovalResult>,
    /// ADD_OR_UPDATE paths with no archive entry. These paths are still out of
    /// sync with the target.
    pub missing_from_archive: Vec<String>,
    /// Archive entries the plan does not mark ADD_OR_UPDATE; not extracted.
    pub ignored_entries: Vec<String>,
    /// ADD_OR_UPDATE paths left unhandled because extraction stopped on an
    /// error. Unlike `missing_from_archive`, these may well be in the archive.
    pub not_applied: Vec<String>,
}

impl EqualizeReport {
    /// Written (or would be written).
    pub fn copied(&self) -> usize {
        self.additions
            .iter()
            .filter(|a| !matches!(a, AdditionResult::Unchanged { .. }))
            .count()
    }

    pub fn unchanged(&self) -> usize {
        self.additions
            .iter()
            .filter(|a| matches!(a, AdditionResult::Unchanged { .. }))
            .count()
    }

    /// Quarantined (or would be quarantined).
    pub fn moved(&self) -> usize {
        self.removals
            .iter()
            .filter(|r| !matches!(r, RemovalResult::AlreadyAbsent { .. }))
            .count()
    }

    pub fn already_absent(&self) -> usize {
        self.removals.len() - self.moved()
    }

    /// True when every ADD_OR_UPDATE path was found in the archive and
    /// handled.
    pub fn is_synchronized(&self) -> bool {
        self.missing_from_archive.is_empty() && self.not_applied.is_empty()
    }

    pub fn summary(&self) -> String {
        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        let mut summary = format!(
            "{prefix}{} copied, {} unchanged, {} moved to quarantine, {} already absent, {} missing from archive",
            self.copied(),
            self.unchanged(),
            self.moved(),
            self.already_absent(),
            self.missing_from_archive.len()
        );
        if !self.not_applied.is_empty() {
            summary.push_str(&format!(", {} not applied", self.not_applied.len()));
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// equalize
// ---------------------------------------------------------------------------

struct Tally<'a> {
    observer: &'a dyn Observer,
    done: usize,
    total: usize,
}

impl Tally<'_> {
    fn tick(&mut self, item: &str) {
        self.done += 1;
        progress(self.observer, self.done, self.total, item);
    }
}

/// Apply `plan` to `current_root`, taking ADD_OR_UPDATE content from
/// `archive`.
///
/// `archive` may be `None` when the plan has no additions; if it does, every
/// addition is then reported in [`EqualizeReport::missing_from_archive`].
pub fn equalize(
    plan: &Plan,
    archive: Option<&Path>,
    current_root: &Path,
    options: &EqualizeOptions,
    observer: &dyn Observer,
) -> Result<EqualizeReport, SyncError> {
    plan.validate()?;
    require_dir(current_root)?;
    if let Some(entry) = plan.entries.iter().find(|e| is_quarantined(&e.path)) {
        return Err(CoreError::InvalidPath {
            path: entry.path.clone(),
            reason: "path is inside the quarantine directory",
        }
        .into());
    }

    let mut report = EqualizeReport {
        dry_run: options.dry_run,
        ..EqualizeReport::default()
    };
    let mut tally = Tally {
        observer,
        done: 0,
        total: plan.len(),
    };
    let mut failures = Vec::new();

    if let Err(error) = quarantine_removals(plan, current_root, options, &mut tally, &mut report) {
        failures.push(StepFailure {
            step: EqualizeStep::Quarantine,
            error,
        });
    }
    if let Err(error) =
        materialize_additions(plan, archive, current_root, options, &mut tally, &mut report)
    {
        failures.push(StepFailure {
            step: EqualizeStep::Materialize,
            error,
        });
    }

    for path in &report.missing_from_archive {
        tracing::warn!(path = %path, "planned addition missing from archive");
        status(observer, format!("missing from archive: {path}"));
    }
    for name in &report.ignored_entries {
        tracing::warn!(entry = %name, "archive entry not in plan; ignored");
        status(observer, format!("ignored archive entry: {name}"));
    }

    if !failures.is_empty() {
        for failure in &failures {
            tracing::error!(step = %failure.step, error = %failure.error, "equalize step failed");
        }
        return Err(SyncError::Equalize {
            failures,
            report: Box::new(report),
        });
    }

    tracing::info!(root = %current_root.display(), "{}", report.summary());
    Ok(report)
}

// ---------------------------------------------------------------------------
// Step 1: quarantine
// ---------------------------------------------------------------------------

fn quarantine_removals(
    plan: &Plan,
    root: &Path,
    options: &EqualizeOptions,
    tally: &mut Tally<'_>,
    report: &mut EqualizeReport,
) -> Result<(), SyncError> {
    for entry in plan.removals() {
        tally.tick(&entry.path);
        reject_linked_parents(root, &entry.path)?;
        let source = join_relative(root, &entry.path);
        match fs::symlink_metadata(&source) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report.removals.push(RemovalResult::AlreadyAbsent {
                    path: entry.path.clone(),
                });
                continue;
            }
            Err(e) => return Err(io_err(&source, e)),
        }

        let destination = free_destination(root, &entry.path)?;
        if options.dry_run {
            report.removals.push(RemovalResult::WouldQuarantine {
                path: entry.path.clone(),
                destination,
            });
            continue;
        }

        let dest_path = join_relative(root, &destination);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::rename(&source, &dest_path).map_err(|e| io_err(&source, e))?;
        prune_empty_parents(root, &source);

        tracing::debug!(path = %entry.path, destination = %destination, "quarantined");
        report.removals.push(RemovalResult::Quarantined {
            path: entry.path.clone(),
            destination,
        });
    }
    Ok(())
}

/// First unoccupied quarantine path for `relative`, as a root-relative string.
///
/// Each component is resolved in turn: an existing directory is entered, while
/// anything else in the way (an earlier quarantined file, a symlink) gets a
/// `.1`, `.2`, … suffix on that component.
fn free_destination(root: &Path, relative: &str) -> Result<String, SyncError> {
    let quarantine = root.join(QUARANTINE_DIR);
    match fs::symlink_metadata(&quarantine) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(SyncError::PathCollision {
                path: quarantine,
                reason: "the quarantine path is not a directory",
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(format!("{QUARANTINE_DIR}/{relative}"))
        }
        Err(e) => return Err(io_err(&quarantine, e)),
    }

    let components: Vec<&str> = relative.split('/').collect();
    let mut resolved = QUARANTINE_DIR.to_string();
    for (i, component) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        let mut name = component.to_string();
        let mut n = 0u32;
        loop {
            let candidate = format!("{resolved}/{name}");
            let path = join_relative(root, &candidate);
            match fs::symlink_metadata(&path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Nothing below a free component can be occupied.
                    let rest = &components[i + 1..];
                    return Ok(if rest.is_empty() {
                        candidate
                    } else {
                        format!("{candidate}/{}", rest.join("/"))
                    });
                }
                Err(e) => return Err(io_err(&path, e)),
                Ok(meta) if !last && meta.is_dir() => {
                    resolved = candidate;
                    break;
                }
                Ok(_) => {
                    n += 1;
                    name = format!("{component}.{n}");
                }
            }
        }
    }
    Ok(resolved)
}

/// Fail when a directory between `root` and `relative` is a symbolic link.
/// Writes and renames must stay inside the tree.
fn reject_linked_parents(root: &Path, relative: &str) -> Result<(), SyncError> {
    let mut dir = root.to_path_buf();
    let mut components = relative.split('/').peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        dir.push(component);
        match fs::symlink_metadata(&dir) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(SyncError::PathCollision {
                    path: dir,
                    reason: "a symbolic link occupies a parent directory",
                })
            }
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_err(&dir, e)),
        }
    }
    Ok(())
}

/// Remove directories between `moved` and `root` that the move left empty.
fn prune_empty_parents(root: &Path, moved: &Path) {
    let mut dir = moved.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        tracing::debug!(dir = %current.display(), "pruned empty directory");
        dir = current.parent();
    }
}

// ---------------------------------------------------------------------------
// Step 2: materialize
// ---------------------------------------------------------------------------

fn materialize_additions(
    plan: &Plan,
    archive: Option<&Path>,
    root: &Path,
    options: &EqualizeOptions,
    tally: &mut Tally<'_>,
    report: &mut EqualizeReport,
) -> Result<(), SyncError> {
    if !plan.has_additions() {
        return Ok(());
    }
    let Some(archive) = archive else {
        record_missing(plan, &HashSet::new(), tally, report);
        return Ok(());
    };

    let result = extract_archive(archive, plan, root, options, tally, report);
    if result.is_err() {
        let handled: HashSet<&str> = report
            .additions
            .iter()
            .map(AdditionResult::path)
            .chain(report.missing_from_archive.iter().map(String::as_str))
            .collect();
        let pending: Vec<String> = plan
            .additions()
            .filter(|e| !handled.contains(e.path.as_str()))
            .map(|e| e.path.clone())
            .collect();
        report.not_applied.extend(pending);
    }
    result
}

/// Record every ADD_OR_UPDATE path absent from the archive index.
fn record_missing(
    plan: &Plan,
    present: &HashSet<&str>,
    tally: &mut Tally<'_>,
    report: &mut EqualizeReport,
) {
    for entry in plan.additions() {
        if !present.contains(entry.path.as_str()) {
            tally.tick(&entry.path);
            report.missing_from_archive.push(entry.path.clone());
        }
    }
}

fn extract_archive(
    archive: &Path,
    plan: &Plan,
    root: &Path,
    options: &EqualizeOptions,
    tally: &mut Tally<'_>,
    report: &mut EqualizeReport,
) -> Result<(), SyncError> {
    let file = File::open(archive).map_err(|e| io_err(archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| zip_err(archive, e))?;
    let present: HashSet<&str> = zip.file_names().collect();
    record_missing(plan, &present, tally, report);

    let wanted: HashSet<&str> = plan.additions().map(|e| e.path.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut buf = vec![0u8; options.chunk_size.max(1)];

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| zip_err(archive, e))?;
        if entry.is_dir() {
            continue;
        }
        let name = checked_entry_name(entry.name(), entry.enclosed_name().is_some())?;
        if !wanted.contains(name.as_str()) || seen.contains(&name) {
            report.ignored_entries.push(name);
            continue;
        }

        tally.tick(&name);
        let mode = entry.unix_mode();
        let result = extract_entry(&mut entry, archive, root, &name, mode, options, &mut buf)?;
        seen.insert(name);
        report.additions.push(result);
    }
    Ok(())
}

/// Accept only names that stay beneath the extraction root.
fn checked_entry_name(name: &str, enclosed: bool) -> Result<String, SyncError> {
    if !enclosed || validate_relative_path(name).is_err() || is_quarantined(name) {
        return Err(SyncError::UnsafeArchiveEntry {
            name: name.to_string(),
        });
    }
    Ok(name.to_string())
}

fn extract_entry<R: Read>(
    reader: &mut R,
    archive: &Path,
    root: &Path,
    name: &str,
    mode: Option<u32>,
    options: &EqualizeOptions,
    buf: &mut [u8],
) -> Result<AdditionResult, SyncError> {
    reject_linked_parents(root, name)?;
    let dest = join_relative(root, name);
    let existing = match fs::symlink_metadata(&dest) {
        Ok(meta) if meta.is_file() => Some(hash_file(&dest, options.algorithm, options.chunk_size)?),
        Ok(meta) if meta.is_dir() => {
            return Err(SyncError::PathCollision {
                path: dest,
                reason: "a directory occupies the path of a planned file",
            })
        }
        Ok(_) => None,
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(&dest, e)),
    };

    if options.dry_run {
        let digest = hash_reader(reader, options.algorithm, options.chunk_size)
            .map_err(|e| zip_err(archive, e.into()))?;
        let path = name.to_string();
        return Ok(if existing.as_deref() == Some(digest.as_str()) {
            AdditionResult::Unchanged { path }
        } else {
            AdditionResult::WouldWrite { path }
        });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = tmp_path(&dest);
    let digest = match write_tmp(reader, &tmp, archive, options.algorithm, buf) {
        Ok(digest) => digest,
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
    };

    let path = name.to_string();
    if existing.as_deref() == Some(digest.as_str()) {
        let _ = fs::remove_file(&tmp);
        tracing::debug!(path = %name, "unchanged");
        return Ok(AdditionResult::Unchanged { path });
    }

    set_mode(&tmp, mode);
    if let Err(e) = fs::rename(&tmp, &dest) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(&dest, e));
    }
    tracing::debug!(path = %name, "written");
    Ok(AdditionResult::Written { path })
}

fn write_tmp<R: Read>(
    reader: &mut R,
    tmp: &Path,
    archive: &Path,
    algorithm: HashAlgorithm,
    buf: &mut [u8],
) -> Result<String, SyncError> {
    let file = File::create(tmp).map_err(|e| io_err(tmp, e))?;
    let mut writer = HashingWriter::new(file, algorithm);
    match copy_chunked(reader, &mut writer, buf) {
        Ok(_) => {}
        Err(CopyFailure::Read(e)) => return Err(zip_err(archive, e.into())),
        Err(CopyFailure::Write(e)) => return Err(io_err(tmp, e)),
    }
    let (file, digest) = writer.finish().map_err(|e| io_err(tmp, e))?;
    file.sync_all().map_err(|e| io_err(tmp, e))?;
    Ok(digest)
}

fn tmp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{name}{TMP_SUFFIX}"))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777)) {
            tracing::warn!(path = %path.display(), error = %e, "could not apply archived permissions");
        }
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
