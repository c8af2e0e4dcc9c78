//! Incremental sync of the source tree into the backup tree
//!
//! The sync engine walks the source tree, asks the [`Classifier`] about every
//! file, and copies what changed into the backup tree while preserving the
//! relative directory structure.
//!
//! ## Per-file decisions
//!
//! | Classification       | Destination state          | Action                          |
//! |----------------------|----------------------------|---------------------------------|
//! | ineligible / ignored | any                        | skipped, no I/O                 |
//! | binary               | missing or bytes differ    | copied, no change record        |
//! | binary               | identical                  | skipped                         |
//! | text                 | missing                    | copied, `Initial copy` logged   |
//! | text                 | different set of lines     | copied, added/removed logged    |
//! | text                 | same set of lines          | skipped                         |
//!
//! ## Ordering
//!
//! Siblings are visited in file-name order, so two runs over the same tree
//! process files in the same order.
//!
//! ## Failures
//!
//! Errors are handled per file: they are logged, emitted as
//! [`SyncEvent::Failed`], recorded in the [`SyncReport`], and the walk moves on.
//! When a destination directory cannot be created, every later file that
//! would land under it fails without another attempt.
//!
//! A top-level source entry named `versions` would be mirrored into the
//! metadata subtree of the backup root. It is skipped and reported as a
//! failure instead.
//!
//! ## Symbolic links
//!
//! A link to a file is backed up as a regular file holding the target's
//! content. Links to directories are not followed. A broken link with an
//! eligible name is reported as a failure.
//!
//! ## Example
//!
//! ```rust,no_run
//! use flatbak::{BackupConfig, ChangeLog, Classifier, SyncEngine};
//!
//! # fn main() -> flatbak::Result<()> {
//! let config = BackupConfig::builder("./notes", "./notes-backup").build();
//! let classifier = Classifier::new(&config)?;
//! let log = ChangeLog::open(&config.meta_dir());
//! std::fs::create_dir_all(config.meta_dir())?;
//!
//! let engine = SyncEngine::new(&config, &classifier);
//! let report = engine.sync(chrono::Local::now().naive_local(), &log, |event| {
//!     println!("{:?}", event);
//! });
//! println!("Copied {} files", report.copied_count());
//! # Ok(())
//! # }
//! ```

use crate::change_log::ChangeLog;
use crate::classifier::Classifier;
use crate::config::BackupConfig;
use crate::diff::detect_changes;
use crate::error::{FlatbakError, Result};
use crate::types::{
    ChangeKind, ChangeOutcome, ChangeRecord, FileEntry, ItemFailure, SyncEvent, SyncReport,
    META_DIR_NAME,
};
use crate::utils;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// What happened to a single file
#[derive(Debug)]
enum FileAction {
    /// Text file copied; carries the record to log
    CopiedText(ChangeRecord),
    /// Binary file copied
    CopiedBinary,
    /// Destination already up to date
    Unchanged,
}

/// Sync engine for one configuration
#[derive(Debug)]
pub struct SyncEngine<'a> {
    config: &'a BackupConfig,
    classifier: &'a Classifier,
}

impl<'a> SyncEngine<'a> {
    /// Create an engine over a validated configuration
    pub fn new(config: &'a BackupConfig, classifier: &'a Classifier) -> Self {
        Self { config, classifier }
    }

    /// Destination path of a file relative to the source root
    pub fn destination_for(&self, relative_path: &Path) -> PathBuf {
        self.config.backup_folder.join(relative_path)
    }

    /// Walk the source tree and return the files the engine would process
    ///
    /// Only eligible, non-ignored regular files are returned. Names are
    /// filtered before any metadata is read. Walk errors are returned
    /// alongside the entries.
    pub fn discover(&self) -> (Vec<FileEntry>, Vec<ItemFailure>) {
        let mut entries = Vec::new();
        let mut failures = Vec::new();
        let mut filtered = 0;
        self.walk(&mut filtered, &mut failures, |entry| entries.push(entry));
        (entries, failures)
    }

    /// Run one sync pass
    ///
    /// `timestamp` stamps every change record of the pass. Change records are
    /// appended to `log` as files are copied. `on_event` receives one event
    /// per processed file.
    #[instrument(skip(self, log, on_event), fields(source = ?self.config.source_folder))]
    pub fn sync<F>(&self, timestamp: NaiveDateTime, log: &ChangeLog, mut on_event: F) -> SyncReport
    where
        F: FnMut(&SyncEvent),
    {
        info!(
            "Syncing {:?} into {:?}",
            self.config.source_folder, self.config.backup_folder
        );
        let mut report = SyncReport::default();
        let mut failed_dirs: Vec<PathBuf> = Vec::new();
        let mut created_dirs: HashSet<PathBuf> = HashSet::new();
        let mut walk_failures = Vec::new();
        let mut filtered = 0;

        self.walk(&mut filtered, &mut walk_failures, |entry| {
            report.files_examined += 1;
            let result = self
                .prepare_destination(&entry, &mut failed_dirs, &mut created_dirs)
                .and_then(|dest| self.process_file(&entry, &dest, timestamp));

            match result {
                Ok(FileAction::CopiedText(record)) => {
                    match record.kind {
                        ChangeKind::Created => report.copied_new += 1,
                        ChangeKind::Modified => report.copied_modified += 1,
                    }
                    on_event(&SyncEvent::Copied {
                        path: entry.relative_path.clone(),
                        kind: record.kind,
                    });
                    match log.append(&record) {
                        Ok(()) => report.change_records.push(record),
                        Err(e) => {
                            warn!("Failed to log change for {:?}: {}", entry.relative_path, e);
                            let failure = ItemFailure::new(
                                &entry.relative_path,
                                format!("copied, but change log append failed: {}", e),
                            );
                            on_event(&SyncEvent::Failed {
                                path: entry.relative_path.clone(),
                                message: failure.message.clone(),
                            });
                            report.failures.push(failure);
                        }
                    }
                }
                Ok(FileAction::CopiedBinary) => {
                    report.copied_binary += 1;
                    on_event(&SyncEvent::BinaryCopied {
                        path: entry.relative_path.clone(),
                    });
                }
                Ok(FileAction::Unchanged) => {
                    report.unchanged += 1;
                    on_event(&SyncEvent::Unchanged {
                        path: entry.relative_path.clone(),
                    });
                }
                Err(e) => {
                    warn!("Error processing file {:?}: {}", entry.relative_path, e);
                    on_event(&SyncEvent::Failed {
                        path: entry.relative_path.clone(),
                        message: e.to_string(),
                    });
                    report
                        .failures
                        .push(ItemFailure::new(&entry.relative_path, e));
                }
            }
        });

        for failure in &walk_failures {
            on_event(&SyncEvent::Failed {
                path: failure.path.clone(),
                message: failure.message.clone(),
            });
        }
        report.failures.extend(walk_failures);
        report.files_filtered = filtered;

        info!(
            "Sync complete: {} examined, {} copied, {} unchanged, {} failed",
            report.files_examined,
            report.copied_count(),
            report.unchanged,
            report.failures.len()
        );
        report
    }

    /// Visit eligible, non-ignored regular files in deterministic order
    fn walk<F>(&self, filtered: &mut usize, failures: &mut Vec<ItemFailure>, mut visit: F)
    where
        F: FnMut(FileEntry),
    {
        let source_root = &self.config.source_folder;
        let nested_backup = self.nested_backup_root();

        let mut walker = WalkDir::new(source_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| match &nested_backup {
                Some(excluded) if e.file_type().is_dir() => e
                    .path()
                    .canonicalize()
                    .map(|p| &p != excluded)
                    .unwrap_or(true),
                _ => true,
            });

        while let Some(item) = walker.next() {
            let dir_entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| source_root.clone());
                    warn!("Walk error at {:?}: {}", path, e);
                    failures.push(ItemFailure::new(path, FlatbakError::from(e)));
                    continue;
                }
            };

            // `versions` at the top would land in the metadata subtree
            if dir_entry.depth() == 1 && dir_entry.file_name() == OsStr::new(META_DIR_NAME) {
                warn!(
                    "Skipping {:?}: the name is reserved for backup metadata",
                    dir_entry.path()
                );
                failures.push(ItemFailure::new(
                    META_DIR_NAME,
                    "name is reserved for backup metadata, not backed up",
                ));
                if dir_entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }

            let file_type = dir_entry.file_type();
            if !file_type.is_file() && !file_type.is_symlink() {
                continue;
            }

            let name = dir_entry.file_name().to_str();
            let wanted = name
                .map(|n| self.classifier.is_eligible(n) && !self.classifier.is_ignored(n))
                .unwrap_or(false);
            if !wanted {
                *filtered += 1;
                continue;
            }

            let metadata = if file_type.is_symlink() {
                match fs::metadata(dir_entry.path()) {
                    Ok(meta) if meta.is_file() => Some(meta),
                    Ok(_) => {
                        debug!("Not following directory link {:?}", dir_entry.path());
                        continue;
                    }
                    Err(e) => {
                        warn!("Broken link {:?}: {}", dir_entry.path(), e);
                        failures.push(ItemFailure::new(dir_entry.path(), e));
                        continue;
                    }
                }
            } else {
                dir_entry.metadata().ok()
            };

            let relative_path = match utils::make_relative(dir_entry.path(), source_root) {
                Ok(rel) => rel,
                Err(e) => {
                    failures.push(ItemFailure::new(dir_entry.path(), e));
                    continue;
                }
            };
            let size = metadata.map(|m| m.len()).unwrap_or(0);

            visit(FileEntry {
                path: dir_entry.path().to_path_buf(),
                relative_path,
                size,
            });
        }
    }

    /// Canonical backup root when it lies inside the source tree
    fn nested_backup_root(&self) -> Option<PathBuf> {
        let backup = self.config.backup_folder.canonicalize().ok()?;
        let source = self.config.source_folder.canonicalize().ok()?;
        (backup != source && backup.starts_with(&source)).then_some(backup)
    }

    /// Create the destination's parent directories
    ///
    /// A directory that failed once is never retried within this pass.
    fn prepare_destination(
        &self,
        entry: &FileEntry,
        failed_dirs: &mut Vec<PathBuf>,
        created_dirs: &mut HashSet<PathBuf>,
    ) -> Result<PathBuf> {
        let dest = self.destination_for(&entry.relative_path);
        let Some(parent) = dest.parent().map(Path::to_path_buf) else {
            return Ok(dest);
        };

        if let Some(failed) = failed_dirs.iter().find(|d| parent.starts_with(d)) {
            return Err(FlatbakError::internal(format!(
                "destination directory {:?} could not be created",
                failed
            )));
        }
        if created_dirs.contains(&parent) {
            return Ok(dest);
        }

        match fs::create_dir_all(&parent) {
            Ok(()) => {
                created_dirs.insert(parent);
                Ok(dest)
            }
            Err(e) => {
                failed_dirs.push(parent);
                Err(e.into())
            }
        }
    }

    /// Classify, compare and copy a single file
    fn process_file(
        &self,
        entry: &FileEntry,
        dest: &Path,
        timestamp: NaiveDateTime,
    ) -> Result<FileAction> {
        let classification = self.classifier.classify(&entry.path)?;

        if classification.is_binary {
            if utils::files_identical(&entry.path, dest)? {
                debug!("Binary unchanged: {:?}", entry.relative_path);
                return Ok(FileAction::Unchanged);
            }
            utils::copy_file(&entry.path, dest)?;
            debug!("Binary copied, diff skipped: {:?}", entry.relative_path);
            return Ok(FileAction::CopiedBinary);
        }

        let record = match detect_changes(&entry.path, dest)? {
            ChangeOutcome::NoChange => {
                debug!("Unchanged: {:?}", entry.relative_path);
                return Ok(FileAction::Unchanged);
            }
            ChangeOutcome::New => ChangeRecord::created(&entry.relative_path, timestamp),
            ChangeOutcome::Changed(delta) => {
                ChangeRecord::modified(&entry.relative_path, delta, timestamp)
            }
        };
        utils::copy_file(&entry.path, dest)?;
        debug!("Copied {:?} ({:?})", entry.relative_path, record.kind);
        Ok(FileAction::CopiedText(record))
    }
}
