//! Retention policy for snapshot archives
//!
//! Keeps the newest `max_count` archives in the metadata subtree and deletes
//! the rest. The set of archives is re-read from disk every time; nothing is
//! remembered between runs.
//!
//! Ordering is by modification time, newest first, with ties broken by name
//! (descending). A `max_count` of zero or less deletes every archive.
//!
//! Deleting one archive may fail (locked file, missing permission) without
//! stopping the deletion of the others; such failures are collected in the
//! [`RetentionReport`].

use crate::archive::{list_archives, ArchiveFile};
use crate::error::{FlatbakError, Result};
use crate::types::{ItemFailure, RetentionReport};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Split a newest-first archive list into (keep, delete)
///
/// Non-positive counts keep nothing.
pub fn split_for_retention(archives: Vec<ArchiveFile>, max_count: i64) -> (Vec<ArchiveFile>, Vec<ArchiveFile>) {
    let keep = usize::try_from(max_count).unwrap_or(0).min(archives.len());
    let mut kept = archives;
    let deleted = kept.split_off(keep);
    (kept, deleted)
}

/// Compute what [`enforce_retention`] would do without deleting anything
pub fn plan_retention(meta_dir: &Path, max_count: i64) -> Result<RetentionReport> {
    let archives = list_archives(meta_dir)
        .map_err(|e| FlatbakError::retention(format!("cannot list {:?}: {}", meta_dir, e)))?;
    let (kept, deleted) = split_for_retention(archives, max_count);
    Ok(RetentionReport {
        kept: kept.into_iter().map(|a| a.path).collect(),
        deleted: deleted.into_iter().map(|a| a.path).collect(),
        failures: Vec::new(),
    })
}

/// Delete archives beyond the newest `max_count`
///
/// # Errors
///
/// - [`FlatbakError::Retention`] if the metadata directory cannot be listed;
///   per-archive deletion failures are reported in the result instead
#[instrument]
pub fn enforce_retention(meta_dir: &Path, max_count: i64) -> Result<RetentionReport> {
    let plan = plan_retention(meta_dir, max_count)?;
    let mut report = RetentionReport {
        kept: plan.kept,
        ..RetentionReport::default()
    };

    for path in plan.deleted {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted old archive {:?}", path);
                report.deleted.push(path);
            }
            Err(e) => {
                warn!("Error deleting archive {:?}: {}", path, e);
                report.failures.push(ItemFailure::new(path, e));
            }
        }
    }

    info!(
        "Retention: kept {}, deleted {}, failed {}",
        report.kept.len(),
        report.deleted.len(),
        report.failures.len()
    );
    Ok(report)
}
