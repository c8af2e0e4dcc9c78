//! End-to-end integration tests for flatbak
//!
//! Drives whole runs against real directory trees and checks the backup
//! tree, the change log and the snapshot archives afterwards.

use ::flatbak::*;
use chrono::{NaiveDate, NaiveDateTime};
use filetime::FileTime;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A source tree and a backup tree under one temporary directory
pub struct BackupHarness {
    pub temp_dir: TempDir,
    pub source: PathBuf,
    pub backup_root: PathBuf,
}

impl BackupHarness {
    /// Create empty source and backup locations
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let backup_root = temp_dir.path().join("backup");
        fs::create_dir_all(&source).unwrap();
        Self {
            temp_dir,
            source,
            backup_root,
        }
    }

    /// Config builder pointing at this harness
    pub fn config(&self) -> BackupConfigBuilder {
        BackupConfig::builder(&self.source, &self.backup_root)
    }

    /// Write a source file, creating parent directories
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) {
        let path = self.source.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Path inside the backup tree
    pub fn backed_up(&self, rel: &str) -> PathBuf {
        self.backup_root.join(rel)
    }

    /// Contents of the change log, or an empty string
    pub fn change_log(&self) -> String {
        fs::read_to_string(self.backup_root.join("versions/change_log.txt")).unwrap_or_default()
    }

    /// Names of the entries of an archive, in stored order
    pub fn archive_entries(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    /// Contents of one archive entry
    pub fn archive_entry(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        let mut buf = Vec::new();
        archive.by_name(name).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }
}

impl Default for BackupHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed run timestamp at `minute:second` past 10:00 on 2024-06-01
pub fn at(minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(10, minute, second)
        .unwrap()
}

fn archive_path(report: &RunReport) -> PathBuf {
    match &report.archive {
        ArchiveOutcome::Created(entry) => entry.path.clone(),
        other => panic!("expected an archive, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_tree_first_run() {
        let h = BackupHarness::new();
        h.write("a.txt", "alpha\nbeta\n");
        h.write("b.txt", "should be ignored\n");
        h.write("c.bin", b"\x00\x01\x02payload");
        h.write("d.log", "not allow-listed\n");

        let backup = Backup::new(
            h.config()
                .file_extensions(vec![".txt".to_string(), ".bin".to_string()])
                .ignore_patterns(vec!["b.*".to_string()])
                .build(),
        )
        .unwrap();

        let mut events = Vec::new();
        let report = backup.run_at(at(0, 0), |e| events.push(e.clone()));

        assert!(report.is_success());
        assert_eq!(report.sync.copied_new, 1);
        assert_eq!(report.sync.copied_binary, 1);
        assert_eq!(report.sync.files_filtered, 2);
        assert!(h.backed_up("a.txt").is_file());
        assert!(h.backed_up("c.bin").is_file());
        assert!(!h.backed_up("b.txt").exists());
        assert!(!h.backed_up("d.log").exists());

        assert_eq!(
            events,
            vec![
                SyncEvent::Copied {
                    path: PathBuf::from("a.txt"),
                    kind: ChangeKind::Created
                },
                SyncEvent::BinaryCopied {
                    path: PathBuf::from("c.bin")
                },
            ]
        );

        // binaries never reach the log
        let log = h.change_log();
        assert_eq!(log, "Changes in a.txt on 2024-06-01 10:00:00\nInitial copy\n\n");

        let archive = archive_path(&report);
        assert!(archive.ends_with("versions/backup_20240601_100000.zip"));
        assert_eq!(
            BackupHarness::archive_entries(&archive),
            vec!["a.txt".to_string(), "c.bin".to_string()]
        );
        assert_eq!(
            BackupHarness::archive_entry(&archive, "c.bin"),
            b"\x00\x01\x02payload".to_vec()
        );
    }

    #[test]
    fn test_modification_is_logged_with_delta() {
        let h = BackupHarness::new();
        h.write("notes/today.txt", "milk\neggs\nbread\n");
        let backup = Backup::new(h.config().build()).unwrap();
        backup.run_at(at(0, 0), |_| {});

        h.write("notes/today.txt", "milk\nbread\nbutter\njam\n");
        let report = backup.run_at(at(1, 0), |_| {});

        assert_eq!(report.sync.copied_modified, 1);
        let record = &report.sync.change_records[0];
        assert_eq!(record.kind, ChangeKind::Modified);
        assert_eq!(record.added_lines, vec!["butter", "jam"]);
        assert_eq!(record.removed_lines, vec!["eggs"]);
        assert_eq!(
            fs::read_to_string(h.backed_up("notes/today.txt")).unwrap(),
            "milk\nbread\nbutter\njam\n"
        );

        let log = h.change_log();
        assert!(log.ends_with(
            "Changes in notes/today.txt on 2024-06-01 10:01:00\n\
             Added lines:\nbutter\njam\n\
             Removed lines:\neggs\n\n"
        ));
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let h = BackupHarness::new();
        h.write("a.txt", "one\n");
        h.write("deep/er/b.txt", "two\n");
        let backup = Backup::new(h.config().build()).unwrap();

        backup.run_at(at(0, 0), |_| {});
        let log_after_first = h.change_log();
        let copy_mtime = fs::metadata(h.backed_up("a.txt")).unwrap().modified().unwrap();

        let report = backup.run_at(at(2, 0), |_| {});
        assert_eq!(report.sync.copied_count(), 0);
        assert_eq!(report.sync.unchanged, 2);
        assert!(report.sync.change_records.is_empty());
        assert_eq!(h.change_log(), log_after_first);
        assert_eq!(
            fs::metadata(h.backed_up("a.txt")).unwrap().modified().unwrap(),
            copy_mtime
        );
        // a snapshot is still taken every run
        assert!(matches!(report.archive, ArchiveOutcome::Created(_)));
    }

    #[test]
    fn test_reordering_lines_is_not_a_change() {
        let h = BackupHarness::new();
        h.write("list.txt", "x\ny\nz\n");
        let backup = Backup::new(h.config().build()).unwrap();
        backup.run_at(at(0, 0), |_| {});

        h.write("list.txt", "z\nx\ny\n");
        let report = backup.run_at(at(0, 30), |_| {});
        assert_eq!(report.sync.copied_count(), 0);
        assert_eq!(
            fs::read_to_string(h.backed_up("list.txt")).unwrap(),
            "x\ny\nz\n"
        );
    }

    #[test]
    fn test_archive_excludes_metadata_subtree() {
        let h = BackupHarness::new();
        h.write("a.txt", "1\n");
        let backup = Backup::new(h.config().build()).unwrap();

        let first = backup.run_at(at(0, 0), |_| {});
        h.write("a.txt", "2\n");
        let second = backup.run_at(at(0, 1), |_| {});

        let entries = BackupHarness::archive_entries(&archive_path(&second));
        assert_eq!(entries, vec!["a.txt".to_string()]);
        assert!(archive_path(&first).is_file());
        assert_eq!(BackupHarness::archive_entry(&archive_path(&second), "a.txt"), b"2\n");
        assert_eq!(BackupHarness::archive_entry(&archive_path(&first), "a.txt"), b"1\n");
    }

    #[test]
    fn test_retention_during_run() {
        let h = BackupHarness::new();
        h.write("a.txt", "content\n");
        let meta = h.backup_root.join("versions");
        fs::create_dir_all(&meta).unwrap();
        for i in 0..25 {
            let path = meta.join(format!("backup_20230101_0000{:02}.zip", i));
            fs::write(&path, b"PK").unwrap();
            filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000 + i, 0))
                .unwrap();
        }

        let backup = Backup::new(h.config().max_zips(20).build()).unwrap();
        let report = backup.run_at(at(0, 0), |_| {});

        let retention = report.retention.as_ref().unwrap();
        assert_eq!(retention.kept.len(), 20);
        assert_eq!(retention.deleted.len(), 6);
        assert_eq!(retention.kept[0], archive_path(&report));

        let remaining = archive::list_archives(&meta).unwrap();
        assert_eq!(remaining.len(), 20);
        for i in 0..6 {
            assert!(!meta.join(format!("backup_20230101_0000{:02}.zip", i)).exists());
        }
        assert!(meta.join("change_log.txt").is_file());
    }

    #[test]
    fn test_ignore_rules_beat_allow_list() {
        let h = BackupHarness::new();
        h.write("keep.txt", "k\n");
        h.write("draft_keep.txt", "d\n");
        h.write("secret.txt", "s\n");
        h.write("sub/draft_notes.txt", "n\n");

        let backup = Backup::new(
            h.config()
                .ignore_files(vec!["secret.txt".to_string()])
                .ignore_patterns(vec!["draft_*".to_string()])
                .build(),
        )
        .unwrap();
        let report = backup.run_at(at(0, 0), |_| {});

        assert_eq!(report.sync.copied_new, 1);
        assert!(h.backed_up("keep.txt").exists());
        assert!(!h.backed_up("draft_keep.txt").exists());
        assert!(!h.backed_up("secret.txt").exists());
        assert!(!h.backed_up("sub/draft_notes.txt").exists());
        assert!(!h.change_log().contains("secret"));
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let h = BackupHarness::new();
        h.write("UPPER.TXT", "shout\n");
        h.write("Mixed.Csv", "a,b\n");
        let backup = Backup::new(
            h.config()
                .file_extensions(vec![".txt".to_string(), "CSV".to_string()])
                .build(),
        )
        .unwrap();
        let report = backup.run_at(at(0, 0), |_| {});
        assert_eq!(report.sync.copied_new, 2);
        assert!(h.backed_up("UPPER.TXT").is_file());
        assert!(h.backed_up("Mixed.Csv").is_file());
    }

    #[test]
    fn test_deleted_source_files_stay_in_backup() {
        let h = BackupHarness::new();
        h.write("gone.txt", "bye\n");
        let backup = Backup::new(h.config().build()).unwrap();
        backup.run_at(at(0, 0), |_| {});

        fs::remove_file(h.source.join("gone.txt")).unwrap();
        let report = backup.run_at(at(0, 5), |_| {});
        assert_eq!(report.sync.files_examined, 0);
        assert!(h.backed_up("gone.txt").is_file());
        assert_eq!(
            BackupHarness::archive_entries(&archive_path(&report)),
            vec!["gone.txt".to_string()]
        );
    }

    #[test]
    fn test_copies_preserve_source_mtime() {
        let h = BackupHarness::new();
        h.write("old.txt", "ancient\n");
        let stamp = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(h.source.join("old.txt"), stamp).unwrap();

        Backup::new(h.config().build()).unwrap().run_at(at(0, 0), |_| {});

        let meta = fs::metadata(h.backed_up("old.txt")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), stamp);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_links_copy_target_content() {
        use std::os::unix::fs::symlink;

        let h = BackupHarness::new();
        let outside = h.temp_dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("target.txt"), "linked\n").unwrap();
        fs::write(outside.join("inner.txt"), "inside linked dir\n").unwrap();
        symlink(outside.join("target.txt"), h.source.join("link.txt")).unwrap();
        symlink(&outside, h.source.join("linkdir")).unwrap();
        symlink(outside.join("missing.txt"), h.source.join("dangling.txt")).unwrap();

        let report = Backup::new(h.config().build()).unwrap().run_at(at(0, 0), |_| {});

        let copy = h.backed_up("link.txt");
        assert!(fs::symlink_metadata(&copy).unwrap().file_type().is_file());
        assert_eq!(fs::read_to_string(&copy).unwrap(), "linked\n");
        assert!(!h.backed_up("linkdir").exists());
        assert_eq!(report.sync.copied_new, 1);
        assert_eq!(report.sync.failures.len(), 1);
        assert!(report.sync.failures[0].path.ends_with("dangling.txt"));
    }
}
