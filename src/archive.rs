//! Snapshot archives of the backup tree
//!
//! After every sync the whole backup tree is bundled into one zip file inside
//! the metadata subtree. The metadata subtree itself (change log, previous
//! archives, program trace copies) is never archived, so snapshots do not
//! grow with every run.
//!
//! ## Naming
//!
//! Archives are named `backup_<YYYYMMDD_HHMMSS>.zip`. Entry names are the
//! paths relative to the backup root, separated by `/`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use flatbak::archive::create_archive;
//! use std::path::Path;
//!
//! # fn main() -> flatbak::Result<()> {
//! let backup = Path::new("./backup");
//! let now = chrono::Local::now().naive_local();
//! match create_archive(backup, &backup.join("versions"), now)? {
//!     Some(entry) => println!("Wrote {:?} ({} files)", entry.path, entry.file_count),
//!     None => println!("Nothing to archive"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{FlatbakError, Result};
use crate::types::{
    ArchiveEntry, ItemFailure, ARCHIVE_EXTENSION, ARCHIVE_PREFIX, NAME_TIMESTAMP_FORMAT,
};
use crate::utils;
use chrono::NaiveDateTime;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Suffix of an archive that is still being written
const PARTIAL_SUFFIX: &str = ".partial";

/// An archive artifact found in the metadata subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    /// Path of the artifact
    pub path: PathBuf,
    /// Base name of the artifact
    pub name: String,
    /// Last modification time
    pub modified: SystemTime,
    /// Size in bytes
    pub size: u64,
}

impl ArchiveFile {
    /// Timestamp embedded in the name, if the name follows the archive scheme
    pub fn name_timestamp(&self) -> Option<NaiveDateTime> {
        parse_archive_name(&self.name)
    }
}

/// File name of the archive for a timestamp
pub fn archive_name(timestamp: NaiveDateTime) -> String {
    format!(
        "{}_{}{}",
        ARCHIVE_PREFIX,
        timestamp.format(NAME_TIMESTAMP_FORMAT),
        ARCHIVE_EXTENSION
    )
}

/// Recover the timestamp from an archive file name
pub fn parse_archive_name(name: &str) -> Option<NaiveDateTime> {
    let stamp = name
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_prefix('_')?
        .strip_suffix(ARCHIVE_EXTENSION)?;
    NaiveDateTime::parse_from_str(stamp, NAME_TIMESTAMP_FORMAT).ok()
}

/// Bundle the backup tree into a new snapshot archive
///
/// # Arguments
///
/// * `backup_root` - Root of the backup tree
/// * `meta_dir` - Metadata subtree; excluded from the archive and receives it
/// * `timestamp` - Timestamp embedded in the archive name
///
/// # Returns
///
/// `Ok(None)` when the backup tree holds no files outside the metadata
/// subtree; no archive is written in that case. Entries that cannot be
/// read or named are left out and listed in [`ArchiveEntry::skipped`].
///
/// The archive is written under a temporary name and renamed into place,
/// so an existing archive of the same name survives a failed write.
///
/// # Errors
///
/// - [`FlatbakError::Archive`] if the archive cannot be written, or if
///   entries exist but none of them could be collected
#[instrument(skip(backup_root, meta_dir))]
pub fn create_archive(
    backup_root: &Path,
    meta_dir: &Path,
    timestamp: NaiveDateTime,
) -> Result<Option<ArchiveEntry>> {
    let (files, skipped) = collect_files(backup_root, meta_dir);
    if files.is_empty() {
        if let Some(first) = skipped.first() {
            return Err(FlatbakError::archive(format!(
                "no file could be collected from {:?} ({} skipped, first {:?}: {})",
                backup_root,
                skipped.len(),
                first.path,
                first.message
            )));
        }
        info!("No files to archive in {:?}", backup_root);
        return Ok(None);
    }

    let path = meta_dir.join(archive_name(timestamp));
    publish_archive(&path, &files)?;

    let size = fs::metadata(&path)
        .map_err(|e| FlatbakError::archive(format!("could not stat {:?}: {}", path, e)))?
        .len();
    info!(
        "Archived {} files into {:?} ({}), {} skipped",
        files.len(),
        path,
        utils::format_bytes(size),
        skipped.len()
    );
    Ok(Some(ArchiveEntry {
        path,
        created_at: timestamp,
        size,
        file_count: files.len(),
        skipped,
    }))
}

/// Write the archive beside `path` and rename it into place
///
/// The temporary file is removed when anything fails.
fn publish_archive(path: &Path, files: &[(PathBuf, String)]) -> Result<()> {
    let mut partial = path.as_os_str().to_os_string();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = write_archive(&partial, files).and_then(|()| Ok(fs::rename(&partial, path)?));
    if let Err(e) = result {
        if let Err(remove_err) = fs::remove_file(&partial) {
            debug!("No partial archive to remove at {:?}: {}", partial, remove_err);
        }
        return Err(FlatbakError::archive(format!(
            "could not write {:?}: {}",
            path, e
        )));
    }
    Ok(())
}

/// Files under `backup_root` outside `meta_dir`, with their entry names
///
/// Entries that cannot be walked or named are returned as failures.
fn collect_files(backup_root: &Path, meta_dir: &Path) -> (Vec<(PathBuf, String)>, Vec<ItemFailure>) {
    let meta_relative = utils::make_relative(meta_dir, backup_root).ok();
    let is_meta = |path: &Path| match (&meta_relative, path.strip_prefix(backup_root)) {
        (Some(meta), Ok(rel)) => rel == meta.as_path(),
        _ => false,
    };

    let mut files = Vec::new();
    let mut skipped = Vec::new();
    let walker = WalkDir::new(backup_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && is_meta(e.path())));

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| backup_root.to_path_buf());
                warn!("Skipping unreadable entry {:?} while archiving: {}", path, e);
                skipped.push(ItemFailure::new(path, FlatbakError::from(e)));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = utils::make_relative(entry.path(), backup_root)
            .and_then(|rel| utils::slash_path(&rel));
        match name {
            Ok(name) => files.push((entry.path().to_path_buf(), name)),
            Err(e) => {
                warn!("Skipping {:?} while archiving: {}", entry.path(), e);
                skipped.push(ItemFailure::new(entry.path(), e));
            }
        }
    }
    (files, skipped)
}

fn write_archive(path: &Path, files: &[(PathBuf, String)]) -> Result<()> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));

    for (source, name) in files {
        let mut input = File::open(source)?;
        let large = input.metadata()?.len() >= u32::MAX as u64;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(large);
        zip.start_file(name.as_str(), options)?;
        io::copy(&mut input, &mut zip)?;
        debug!("Archived {}", name);
    }

    let mut writer = zip.finish()?;
    io::Write::flush(&mut writer)?;
    Ok(())
}

/// List archive artifacts in the metadata subtree, newest first
///
/// Every entry whose name ends in `.zip` counts as an archive. Entries are
/// ordered by modification time, descending, ties broken by name
/// descending.
///
/// # Errors
///
/// - [`FlatbakError::Io`] if the directory cannot be listed
pub fn list_archives(meta_dir: &Path) -> Result<Vec<ArchiveFile>> {
    let mut archives = Vec::new();
    for item in fs::read_dir(meta_dir)? {
        let entry = item?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(ARCHIVE_EXTENSION) {
            continue;
        }
        let meta = entry.metadata()?;
        archives.push(ArchiveFile {
            path: entry.path(),
            name,
            modified: meta.modified()?,
            size: meta.len(),
        });
    }
    archives.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(archives)
}
