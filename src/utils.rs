//! Utility functions for flatbak
//!
//! This module provides the small file-system helpers used by the sync
//! engine, the archiver and the CLI.
//!
//! ## Categories of Utilities
//!
//! ### File Operations
//! - Byte-for-byte file comparison
//! - Content-exact copying that preserves modification times
//!
//! ### Path Manipulation
//! - Converting absolute paths to relative paths
//! - Rendering relative paths with `/` separators
//!
//! ### Formatting
//! - Human-readable byte sizes
//!
//! All functions return `Result<T, FlatbakError>` where they touch the file
//! system.

use crate::error::{FlatbakError, Result};
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// Buffer size used for streaming comparisons
const COMPARE_BUFFER: usize = 64 * 1024;

/// Check whether two files hold exactly the same bytes
///
/// Sizes are compared first; contents are streamed only when the sizes
/// match. A missing `b` is reported as "not identical" rather than as an
/// error.
///
/// # Errors
///
/// - [`FlatbakError::Io`] if `a` cannot be read, or `b` exists but cannot be read
pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let b_meta = match fs::metadata(b) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let a_meta = fs::metadata(a)?;
    if a_meta.len() != b_meta.len() || !b_meta.is_file() {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(File::open(b)?);
    let mut buf_a = vec![0u8; COMPARE_BUFFER];
    let mut buf_b = vec![0u8; COMPARE_BUFFER];

    loop {
        let read_a = read_full(&mut reader_a, &mut buf_a)?;
        let read_b = read_full(&mut reader_b, &mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as possible; returns the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Copy a file byte-for-byte and carry over its modification time
///
/// Returns the number of bytes copied. Failing to set the timestamp is not
/// an error; the content is what matters.
pub fn copy_file(source: &Path, dest: &Path) -> Result<u64> {
    let bytes = fs::copy(source, dest)?;
    if let Ok(meta) = fs::metadata(source) {
        let mtime = FileTime::from_last_modification_time(&meta);
        if let Err(e) = filetime::set_file_mtime(dest, mtime) {
            tracing::debug!("Could not preserve mtime on {:?}: {}", dest, e);
        }
    }
    Ok(bytes)
}

/// Convert an absolute path to a path relative to `base`
///
/// A lexical strip is tried first; if it fails both paths are
/// canonicalized and stripped again.
///
/// # Errors
///
/// - [`FlatbakError::Internal`] if `path` is not under `base`
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            FlatbakError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Render a relative path with `/` separators
///
/// Used for change-log entries and archive entry names so that both read
/// the same on every platform.
pub fn slash_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| FlatbakError::PathConversion(part.to_os_string()))?,
            ),
            Component::CurDir => {}
            other => {
                return Err(FlatbakError::internal(format!(
                    "Unexpected component {:?} in relative path {:?}",
                    other, path
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Format bytes in human-readable form
///
/// Uses 1024 as the conversion factor.
///
/// ```rust,ignore
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
