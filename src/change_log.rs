//! Append-only change log
//!
//! Every copied text file gets one human-readable entry in
//! `versions/change_log.txt`. The log is only ever appended to; retention
//! never touches it.
//!
//! ## Entry format
//!
//! ```text
//! Changes in notes/todo.txt on 2024-03-01 12:00:00
//! Added lines:
//! buy milk
//! Removed lines:
//! call bob
//!
//! ```
//!
//! A first copy is logged as `Initial copy` instead of listing every line.

use crate::error::Result;
use crate::types::{ChangeKind, ChangeRecord, CHANGE_LOG_NAME, LOG_TIMESTAMP_FORMAT};
use crate::utils;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Handle to the change log of a backup tree
#[derive(Debug, Clone)]
pub struct ChangeLog {
    path: PathBuf,
}

impl ChangeLog {
    /// Change log living in the given metadata directory
    ///
    /// The file is created on the first append.
    pub fn open(meta_dir: &Path) -> Self {
        Self {
            path: meta_dir.join(CHANGE_LOG_NAME),
        }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    ///
    /// The entry is rendered completely before a single write, so a failure
    /// never leaves half an entry behind in the buffer.
    pub fn append(&self, record: &ChangeRecord) -> Result<()> {
        let entry = render_entry(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())?;
        trace!("Logged change for {:?}", record.relative_path);
        Ok(())
    }
}

/// Render a record in the log's text format
pub fn render_entry(record: &ChangeRecord) -> Result<String> {
    let mut entry = format!(
        "Changes in {} on {}\n",
        utils::slash_path(&record.relative_path)?,
        record.timestamp.format(LOG_TIMESTAMP_FORMAT)
    );
    match record.kind {
        ChangeKind::Created => entry.push_str("Initial copy\n"),
        ChangeKind::Modified => {
            if !record.added_lines.is_empty() {
                entry.push_str("Added lines:\n");
                for line in &record.added_lines {
                    entry.push_str(line);
                    entry.push('\n');
                }
            }
            if !record.removed_lines.is_empty() {
                entry.push_str("Removed lines:\n");
                for line in &record.removed_lines {
                    entry.push_str(line);
                    entry.push('\n');
                }
            }
        }
    }
    entry.push('\n');
    Ok(entry)
}
