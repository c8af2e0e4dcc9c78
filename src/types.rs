//! Core data types used throughout the flatbak library
//!
//! This module contains the data structures shared by the classifier, the
//! change detector, the sync engine, the archiver and the retention manager.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Discovered files**: `FileEntry`, `Classification`
//! - **Changes**: `LineDelta`, `ChangeOutcome`, `ChangeRecord`
//! - **Results**: `SyncReport`, `ArchiveOutcome`, `RetentionReport`, `RunReport`
//! - **Progress**: `SyncEvent` emitted while a sync is running
//!
//! ## Examples
//!
//! ```rust
//! use flatbak::types::{LineDelta, ChangeOutcome};
//!
//! let delta = LineDelta {
//!     added_lines: vec!["d".to_string()],
//!     removed_lines: vec!["b".to_string()],
//! };
//! assert!(!delta.is_empty());
//! let outcome = ChangeOutcome::Changed(delta);
//! assert!(outcome.requires_copy());
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the metadata subtree inside the backup root
pub const META_DIR_NAME: &str = "versions";

/// File name of the append-only change log inside the metadata subtree
pub const CHANGE_LOG_NAME: &str = "change_log.txt";

/// Name prefix of snapshot archives
pub const ARCHIVE_PREFIX: &str = "backup";

/// Extension of snapshot archives (including the dot)
pub const ARCHIVE_EXTENSION: &str = ".zip";

/// Name prefix of program trace copies
pub const TRACE_PREFIX: &str = "backup_script";

/// Timestamp format embedded in artifact names
pub const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamp format used in human-readable log entries
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A file discovered under the source root
///
/// Entries are created per walk iteration and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute (or walk-rooted) path of the file
    pub path: PathBuf,
    /// Path relative to the source root
    pub relative_path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// How the classifier sees a single file
///
/// `is_binary` is only meaningful when the file is eligible and not ignored;
/// for every other file it is `false` because the content is never read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Extension is on the allow-list
    pub is_eligible: bool,
    /// Base name matches an ignore name or pattern
    pub is_ignored: bool,
    /// Content looks binary
    pub is_binary: bool,
}

impl Classification {
    /// Whether the sync engine should process this file at all
    pub fn should_process(&self) -> bool {
        self.is_eligible && !self.is_ignored
    }
}

/// Lines added to and removed from a text file
///
/// Computed by set membership of whole lines, not by sequence alignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelta {
    /// Lines of the new content absent from the old content, in new order
    pub added_lines: Vec<String>,
    /// Lines of the old content absent from the new content, in old order
    pub removed_lines: Vec<String>,
}

impl LineDelta {
    /// Check if there are no added and no removed lines
    pub fn is_empty(&self) -> bool {
        self.added_lines.is_empty() && self.removed_lines.is_empty()
    }
}

/// Result of comparing a source text file with its backed-up copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// No backed-up copy exists yet
    New,
    /// Same set of lines on both sides
    NoChange,
    /// Lines were added and/or removed
    Changed(LineDelta),
}

impl ChangeOutcome {
    /// Whether this outcome means the source must be copied over
    pub fn requires_copy(&self) -> bool {
        !matches!(self, ChangeOutcome::NoChange)
    }
}

/// Kind of a change-log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// First copy of a file into the backup tree
    Created,
    /// Existing backup copy replaced
    Modified,
}

/// A single entry of the change log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Path relative to the source root
    pub relative_path: PathBuf,
    /// Whether this is an initial copy or a modification
    pub kind: ChangeKind,
    /// Added lines (empty for `Created`)
    pub added_lines: Vec<String>,
    /// Removed lines (empty for `Created`)
    pub removed_lines: Vec<String>,
    /// When the change was recorded
    pub timestamp: NaiveDateTime,
}

impl ChangeRecord {
    /// Record for a file copied for the first time
    pub fn created(relative_path: &Path, timestamp: NaiveDateTime) -> Self {
        Self {
            relative_path: relative_path.to_path_buf(),
            kind: ChangeKind::Created,
            added_lines: Vec::new(),
            removed_lines: Vec::new(),
            timestamp,
        }
    }

    /// Record for a modified file
    pub fn modified(relative_path: &Path, delta: LineDelta, timestamp: NaiveDateTime) -> Self {
        Self {
            relative_path: relative_path.to_path_buf(),
            kind: ChangeKind::Modified,
            added_lines: delta.added_lines,
            removed_lines: delta.removed_lines,
            timestamp,
        }
    }
}

/// A per-item failure that did not abort the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Path of the item that failed
    pub path: PathBuf,
    /// Human-readable reason
    pub message: String,
}

impl ItemFailure {
    /// Create a failure from any displayable error
    pub fn new(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Progress events emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Text file copied (new or modified)
    Copied {
        /// Relative path of the file
        path: PathBuf,
        /// Whether it was a first copy
        kind: ChangeKind,
    },
    /// Binary file copied; diffing and logging were skipped
    BinaryCopied {
        /// Relative path of the file
        path: PathBuf,
    },
    /// File already up to date
    Unchanged {
        /// Relative path of the file
        path: PathBuf,
    },
    /// File could not be processed
    Failed {
        /// Relative path of the file
        path: PathBuf,
        /// Reason
        message: String,
    },
}

/// Outcome of a sync pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Eligible, non-ignored files that were examined
    pub files_examined: usize,
    /// Files skipped by the extension allow-list or ignore rules
    pub files_filtered: usize,
    /// Text files copied for the first time
    pub copied_new: usize,
    /// Text files copied because their lines changed
    pub copied_modified: usize,
    /// Binary files copied
    pub copied_binary: usize,
    /// Files already up to date
    pub unchanged: usize,
    /// Records appended to the change log
    pub change_records: Vec<ChangeRecord>,
    /// Files that failed
    pub failures: Vec<ItemFailure>,
}

impl SyncReport {
    /// Total number of files copied
    pub fn copied_count(&self) -> usize {
        self.copied_new + self.copied_modified + self.copied_binary
    }

    /// Check if any file failed
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// A snapshot archive in the metadata subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path of the archive file
    pub path: PathBuf,
    /// Creation timestamp embedded in the name
    pub created_at: NaiveDateTime,
    /// Archive size in bytes
    pub size: u64,
    /// Number of files stored in the archive
    pub file_count: usize,
    /// Entries of the backup tree that could not be archived
    #[serde(default)]
    pub skipped: Vec<ItemFailure>,
}

/// What happened to the snapshot step of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArchiveOutcome {
    /// A new archive was written
    Created(ArchiveEntry),
    /// Backup tree had no files; nothing written
    Empty,
    /// Archive could not be written
    Failed(String),
    /// Step did not run because setup failed
    NotRun,
}

impl ArchiveOutcome {
    /// Whether this outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, ArchiveOutcome::Failed(_))
    }
}

/// Outcome of enforcing the retention policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionReport {
    /// Archives kept, newest first
    pub kept: Vec<PathBuf>,
    /// Archives deleted
    pub deleted: Vec<PathBuf>,
    /// Archives that could not be deleted
    pub failures: Vec<ItemFailure>,
}

/// Full result of a backup run
///
/// A run never returns an error once the configuration has been accepted;
/// everything that went wrong is recorded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Timestamp used for artifact names and log entries
    pub timestamp: NaiveDateTime,
    /// Sync pass result
    pub sync: SyncReport,
    /// Snapshot step result
    pub archive: ArchiveOutcome,
    /// Retention step result, if it ran
    pub retention: Option<RetentionReport>,
    /// Retention listing error, if any
    pub retention_error: Option<String>,
    /// Error that stopped the run before syncing
    pub setup_error: Option<String>,
    /// Path of the change log
    pub change_log: PathBuf,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// Whether the run succeeded
    ///
    /// Per-file and per-archive deletion failures are surfaced in the report
    /// but do not change the overall status.
    pub fn is_success(&self) -> bool {
        self.setup_error.is_none() && !self.archive.is_failure()
    }

    /// Number of recovered per-item failures across all steps
    pub fn warning_count(&self) -> usize {
        let archive_skipped = match &self.archive {
            ArchiveOutcome::Created(entry) => entry.skipped.len(),
            _ => 0,
        };
        self.sync.failures.len()
            + archive_skipped
            + self
                .retention
                .as_ref()
                .map(|r| r.failures.len())
                .unwrap_or(0)
            + usize::from(self.retention_error.is_some())
    }
}
