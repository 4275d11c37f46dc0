//! Payload packaging.
//!
//! Streams every ADD_OR_UPDATE file of a plan from the target tree into a zip
//! archive, entry name = plan path. The archive is built under a `.tmp`
//! sibling and renamed into place once complete.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use equalizer_core::{
    files::tmp_sibling, types::join_relative, Compression, EqualizerConfig, Plan, SkippedItem,
};

use crate::error::{io_err, require_dir, zip_err, SyncError};
use crate::progress::{progress, status, Observer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    pub compression: Compression,
    pub chunk_size: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self::from(&EqualizerConfig::default())
    }
}

impl From<&EqualizerConfig> for PackOptions {
    fn from(config: &EqualizerConfig) -> Self {
        Self {
            compression: config.compression,
            chunk_size: config.chunk_size,
        }
    }
}

/// Result of a packaging run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PackOutcome {
    /// The plan has no ADD_OR_UPDATE entries; no archive was written.
    NothingToPackage,
    Packed(PackReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackReport {
    pub archive: PathBuf,
    /// Plan paths written into the archive, in plan order.
    pub packed: Vec<String>,
    /// Plan paths that could not be packaged. The archive is incomplete
    /// relative to the plan when this is non-empty.
    pub skipped: Vec<SkippedItem>,
    /// Uncompressed bytes written.
    pub bytes: u64,
}

impl PackReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Package the plan's additions from `target_root` into `archive`.
pub fn pack(
    plan: &Plan,
    target_root: &Path,
    archive: &Path,
    options: &PackOptions,
    observer: &dyn Observer,
) -> Result<PackOutcome, SyncError> {
    plan.validate()?;
    require_dir(target_root)?;

    let additions: Vec<&str> = plan.additions().map(|e| e.path.as_str()).collect();
    if additions.is_empty() {
        tracing::info!("nothing to package");
        status(observer, "nothing to package");
        return Ok(PackOutcome::NothingToPackage);
    }

    if let Some(parent) = archive.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = tmp_sibling(archive);
    let result = write_archive(&tmp, &additions, target_root, options, observer)
        .and_then(|written| {
            std::fs::rename(&tmp, archive).map_err(|e| io_err(archive, e))?;
            Ok(written)
        });

    match result {
        Ok((packed, skipped, bytes)) => {
            for item in &skipped {
                tracing::warn!(path = %item.path, reason = %item.reason, "not packaged");
                status(observer, format!("not packaged {}: {}", item.path, item.reason));
            }
            tracing::info!(
                archive = %archive.display(),
                packed = packed.len(),
                skipped = skipped.len(),
                "pack complete"
            );
            Ok(PackOutcome::Packed(PackReport {
                archive: archive.to_path_buf(),
                packed,
                skipped,
                bytes,
            }))
        }
        Err(err) => {
            let _ = std::fs::remove_file(&tmp);
            Err(err)
        }
    }
}

type Written = (Vec<String>, Vec<SkippedItem>, u64);

fn write_archive(
    tmp: &Path,
    additions: &[&str],
    target_root: &Path,
    options: &PackOptions,
    observer: &dyn Observer,
) -> Result<Written, SyncError> {
    let file = File::create(tmp).map_err(|e| io_err(tmp, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let method = match options.compression {
        Compression::Deflated => CompressionMethod::Deflated,
        Compression::Stored => CompressionMethod::Stored,
    };
    let mut buf = vec![0u8; options.chunk_size.max(1)];

    let mut packed = Vec::new();
    let mut skipped = Vec::new();
    let mut bytes = 0u64;
    let total = additions.len();

    for (i, relative) in additions.iter().enumerate() {
        progress(observer, i, total, relative);
        let source = join_relative(target_root, relative);

        let (mut reader, entry_options) = match open_source(&source, method) {
            Ok(opened) => opened,
            Err(err) => {
                skipped.push(SkippedItem::new(*relative, err));
                continue;
            }
        };

        zip.start_file(*relative, entry_options)
            .map_err(|e| zip_err(tmp, e))?;
        match copy_chunked(&mut reader, &mut zip, &mut buf) {
            Ok(n) => {
                tracing::debug!(path = %relative, bytes = n, "packed");
                bytes += n;
                packed.push(relative.to_string());
            }
            Err(CopyFailure::Read(err)) => {
                zip.abort_file().map_err(|e| zip_err(tmp, e))?;
                skipped.push(SkippedItem::new(*relative, err));
            }
            Err(CopyFailure::Write(err)) => return Err(io_err(tmp, err)),
        }
    }
    progress(observer, total, total, "");

    let mut writer = zip.finish().map_err(|e| zip_err(tmp, e))?;
    writer.flush().map_err(|e| io_err(tmp, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| io_err(tmp, e.into_error()))?;
    file.sync_all().map_err(|e| io_err(tmp, e))?;

    Ok((packed, skipped, bytes))
}

fn open_source(source: &Path, method: CompressionMethod) -> io::Result<(File, SimpleFileOptions)> {
    let meta = std::fs::metadata(source)?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    let file = File::open(source)?;
    let options = SimpleFileOptions::default()
        .compression_method(method)
        .large_file(meta.len() >= u64::from(u32::MAX));
    Ok((file, with_permissions(options, &meta)))
}

#[cfg(unix)]
fn with_permissions(options: SimpleFileOptions, meta: &std::fs::Metadata) -> SimpleFileOptions {
    use std::os::unix::fs::PermissionsExt;
    options.unix_permissions(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn with_permissions(options: SimpleFileOptions, _meta: &std::fs::Metadata) -> SimpleFileOptions {
    options
}

/// Which side of a chunked copy failed.
pub(crate) enum CopyFailure {
    Read(io::Error),
    Write(io::Error),
}

/// Copy `reader` into `writer` through `buf`, keeping read and write errors
/// apart so callers can tell a bad source from a bad destination.
pub(crate) fn copy_chunked<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
) -> Result<u64, CopyFailure> {
    let mut total = 0u64;
    loop {
        let n = match reader.read(buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyFailure::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyFailure::Write)?;
        total += n as u64;
    }
}
