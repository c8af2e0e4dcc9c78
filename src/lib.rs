//! # flatbak - Incremental flat-file backups
//!
//! A small, stateless backup engine for text and flat files. Each run
//! mirrors the selected files of a source tree into a backup tree, writes a
//! human-readable log of changed lines, and keeps a bounded set of zip
//! snapshots of the backup tree.
//!
//! ## Overview
//!
//! A run consists of:
//! - **Classification**: only files with an allowed extension are looked at;
//!   ignore names and wildcard patterns exclude more; NUL bytes mark binaries
//! - **Change detection**: text files are compared by set membership of
//!   lines, so reordering lines is not a change
//! - **Sync**: new and changed files are copied, preserving the directory
//!   structure; text changes are appended to `versions/change_log.txt`
//! - **Archiving**: the backup tree (without `versions/`) is zipped into
//!   `versions/backup_<YYYYMMDD_HHMMSS>.zip`
//! - **Retention**: only the newest `max_zips` archives are kept
//!
//! Nothing is remembered between runs. Every decision is derived from the
//! source tree, the backup tree and the configuration, so an interrupted run
//! is completed by simply running again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flatbak::{Backup, BackupConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackupConfig::builder("./source", "./backup")
//!     .file_extensions(vec![".txt".to_string(), ".csv".to_string()])
//!     .ignore_files(vec!["scratch.txt".to_string()])
//!     .ignore_patterns(vec!["*.bak".to_string(), "temp*".to_string()])
//!     .max_zips(20)
//!     .build();
//!
//! let report = Backup::new(config)?.run();
//! for record in &report.sync.change_records {
//!     println!("{:?}: +{} -{}", record.relative_path,
//!         record.added_lines.len(), record.removed_lines.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Configuration problems are returned as [`FlatbakError`] from
//! [`Backup::new`], before any file is touched. After that, per-file
//! failures, archive failures and retention failures are collected in the
//! [`RunReport`] instead of aborting the run.
//!
//! ## Module Organization
//!
//! - [`config`]: Configuration value, builder and file loading
//! - [`classifier`]: Extension, ignore and binary classification
//! - [`diff`]: Set-difference line change detection
//! - [`sync`]: The sync engine
//! - [`change_log`]: Append-only change log
//! - [`archive`]: Snapshot archives
//! - [`retention`]: Archive retention policy
//! - [`trace`]: Program trace copies
//! - [`backup`]: Run orchestration
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling

pub mod archive;
pub mod backup;
pub mod change_log;
pub mod classifier;
pub mod config;
pub mod diff;
pub mod error;
pub mod retention;
pub mod sync;
pub mod trace;
pub mod types;

mod utils;

pub use backup::Backup;
pub use change_log::ChangeLog;
pub use classifier::Classifier;
pub use config::{BackupConfig, BackupConfigBuilder};
pub use error::{FlatbakError, Result};
pub use sync::SyncEngine;
pub use types::*;
pub use utils::format_bytes;
