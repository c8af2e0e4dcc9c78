//! Backup run orchestration
//!
//! [`Backup`] ties the components together for one run:
//!
//! 1. **Validate** the configuration (before any file I/O)
//! 2. **Prepare** the backup root and its `versions/` metadata subtree
//! 3. **Sync** the source tree into the backup tree
//! 4. **Archive** the backup tree into a timestamped zip
//! 5. **Retain** only the newest `max_zips` archives
//!
//! Once a configuration is accepted, a run never returns an error. Every
//! problem is recorded in the [`RunReport`], which the caller can inspect.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use flatbak::{Backup, BackupConfig};
//!
//! # fn main() -> flatbak::Result<()> {
//! let config = BackupConfig::builder("./notes", "./notes-backup")
//!     .file_extensions(vec![".txt".to_string(), ".md".to_string()])
//!     .ignore_patterns(vec!["*.bak".to_string()])
//!     .max_zips(10)
//!     .build();
//!
//! let backup = Backup::new(config)?;
//! let report = backup.run();
//! println!("Copied {} files", report.sync.copied_count());
//! if !report.is_success() {
//!     eprintln!("Backup finished with errors");
//! }
//! # Ok(())
//! # }
//! ```

use crate::archive::create_archive;
use crate::change_log::ChangeLog;
use crate::classifier::Classifier;
use crate::config::BackupConfig;
use crate::error::Result;
use crate::retention::enforce_retention;
use crate::sync::SyncEngine;
use crate::types::{ArchiveOutcome, RunReport, SyncEvent, SyncReport};
use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// A validated backup job
#[derive(Debug, Clone)]
pub struct Backup {
    config: BackupConfig,
    classifier: Classifier,
}

impl Backup {
    /// Validate a configuration and prepare a job
    ///
    /// No file is created or modified here.
    ///
    /// # Errors
    ///
    /// - [`FlatbakError::SameSourceAndBackup`](crate::FlatbakError::SameSourceAndBackup)
    /// - [`FlatbakError::SourceMissing`](crate::FlatbakError::SourceMissing)
    /// - [`FlatbakError::InvalidPattern`](crate::FlatbakError::InvalidPattern)
    /// - [`FlatbakError::InvalidConfiguration`](crate::FlatbakError::InvalidConfiguration)
    pub fn new(config: BackupConfig) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;
        let classifier = Classifier::new(&config)?;
        Ok(Self { config, classifier })
    }

    /// Configuration of this job
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Classifier compiled from the configuration
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Metadata subtree of the backup root
    pub fn meta_dir(&self) -> PathBuf {
        self.config.meta_dir()
    }

    /// Run with the current local time and no event handler
    pub fn run(&self) -> RunReport {
        self.run_at(Local::now().naive_local(), |_| {})
    }

    /// Run with the current local time, forwarding sync events
    pub fn run_with_events<F>(&self, on_event: F) -> RunReport
    where
        F: FnMut(&SyncEvent),
    {
        self.run_at(Local::now().naive_local(), on_event)
    }

    /// Run with an explicit timestamp
    ///
    /// The timestamp names the archive and stamps the change records.
    #[instrument(skip(self, on_event))]
    pub fn run_at<F>(&self, timestamp: NaiveDateTime, on_event: F) -> RunReport
    where
        F: FnMut(&SyncEvent),
    {
        let start = Instant::now();
        let meta_dir = self.meta_dir();
        let log = ChangeLog::open(&meta_dir);
        let mut report = RunReport {
            timestamp,
            sync: SyncReport::default(),
            archive: ArchiveOutcome::NotRun,
            retention: None,
            retention_error: None,
            setup_error: None,
            change_log: log.path().to_path_buf(),
            duration_ms: 0,
        };

        if let Err(e) = fs::create_dir_all(&meta_dir) {
            error!("Cannot create metadata directory {:?}: {}", meta_dir, e);
            report.setup_error = Some(format!(
                "cannot create metadata directory {:?}: {}",
                meta_dir, e
            ));
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        }

        let engine = SyncEngine::new(&self.config, &self.classifier);
        report.sync = engine.sync(timestamp, &log, on_event);

        report.archive = match create_archive(&self.config.backup_folder, &meta_dir, timestamp) {
            Ok(Some(entry)) => ArchiveOutcome::Created(entry),
            Ok(None) => ArchiveOutcome::Empty,
            Err(e) => {
                error!("Error creating archive: {}", e);
                ArchiveOutcome::Failed(e.to_string())
            }
        };

        match enforce_retention(&meta_dir, self.config.max_zips) {
            Ok(retention) => report.retention = Some(retention),
            Err(e) => {
                warn!("Retention skipped: {}", e);
                report.retention_error = Some(e.to_string());
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Backup run finished in {}ms: {} copied, {} change records, success={}",
            report.duration_ms,
            report.sync.copied_count(),
            report.sync.change_records.len(),
            report.is_success()
        );
        report
    }
}
