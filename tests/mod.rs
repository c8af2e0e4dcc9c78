//! Main test module for flatbak
//!
//! This module includes all test suites:
//! - Integration tests for whole backup runs
//! - Chaos tests for failures injected into the trees
//! - Property-based tests for change detection and retention
//! - Edge cases around names, encodings and line endings

pub mod integration;

#[cfg(test)]
mod edge_cases {
    use crate::integration::{at, BackupHarness};
    use ::flatbak::*;
    use std::fs;

    #[test]
    fn test_empty_source_directory() {
        let h = BackupHarness::new();
        let report = Backup::new(h.config().build()).unwrap().run_at(at(0, 0), |_| {});

        assert!(report.is_success());
        assert_eq!(report.sync.files_examined, 0);
        assert!(matches!(report.archive, ArchiveOutcome::Empty));
        assert!(h.backup_root.join("versions").is_dir());
        assert!(archive::list_archives(&h.backup_root.join("versions"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_empty_file_is_copied_once() {
        let h = BackupHarness::new();
        h.write("empty.txt", "");
        let backup = Backup::new(h.config().build()).unwrap();

        let first = backup.run_at(at(0, 0), |_| {});
        assert_eq!(first.sync.copied_new, 1);
        assert_eq!(fs::metadata(h.backed_up("empty.txt")).unwrap().len(), 0);

        let second = backup.run_at(at(0, 1), |_| {});
        assert_eq!(second.sync.unchanged, 1);
    }

    #[test]
    fn test_line_ending_change_is_not_a_change() {
        let h = BackupHarness::new();
        h.write("crlf.txt", "one\ntwo\n");
        let backup = Backup::new(h.config().build()).unwrap();
        backup.run_at(at(0, 0), |_| {});

        h.write("crlf.txt", "one\r\ntwo\r\n");
        let report = backup.run_at(at(0, 1), |_| {});
        assert_eq!(report.sync.copied_count(), 0);
    }

    #[test]
    fn test_adding_final_newline_is_copied() {
        let h = BackupHarness::new();
        h.write("tail.txt", "a\nb");
        let backup = Backup::new(h.config().build()).unwrap();
        backup.run_at(at(0, 0), |_| {});

        h.write("tail.txt", "a\nb\n");
        let report = backup.run_at(at(0, 1), |_| {});
        assert_eq!(report.sync.copied_modified, 1);
        let record = &report.sync.change_records[0];
        assert_eq!(record.added_lines, vec!["b"]);
        assert_eq!(record.removed_lines, vec!["b"]);
        assert_eq!(fs::read(h.backed_up("tail.txt")).unwrap(), b"a\nb\n");

        let again = backup.run_at(at(0, 2), |_| {});
        assert_eq!(again.sync.copied_count(), 0);
    }

    #[test]
    fn test_invalid_utf8_text_is_diffed_lossily() {
        let h = BackupHarness::new();
        h.write("latin1.txt", b"caf\xe9\nbar\n");
        let backup = Backup::new(h.config().build()).unwrap();
        backup.run_at(at(0, 0), |_| {});

        h.write("latin1.txt", b"caf\xe9\nbaz\n");
        let report = backup.run_at(at(0, 1), |_| {});
        assert_eq!(report.sync.copied_modified, 1);
        let record = &report.sync.change_records[0];
        assert_eq!(record.added_lines, vec!["baz"]);
        assert_eq!(record.removed_lines, vec!["bar"]);
        assert_eq!(fs::read(h.backed_up("latin1.txt")).unwrap(), b"caf\xe9\nbaz\n");
    }

    #[test]
    fn test_nul_byte_makes_text_extension_binary() {
        let h = BackupHarness::new();
        h.write("sneaky.txt", b"looks like text\x00but is not");
        let report = Backup::new(h.config().build()).unwrap().run_at(at(0, 0), |_| {});

        assert_eq!(report.sync.copied_binary, 1);
        assert!(report.sync.change_records.is_empty());
        assert!(!h.change_log().contains("sneaky.txt"));
    }

    #[test]
    fn test_special_and_unicode_filenames() {
        let h = BackupHarness::new();
        let names = [
            "file with spaces.txt",
            "file.with.dots.txt",
            "file(with)parens.txt",
            "файл.txt",
            "文件.txt",
        ];
        let mut created = Vec::new();
        for name in names {
            if fs::write(h.source.join(name), format!("content of {}\n", name)).is_ok() {
                created.push(name);
            }
        }

        let report = Backup::new(h.config().build()).unwrap().run_at(at(0, 0), |_| {});
        assert_eq!(report.sync.copied_new, created.len());
        for name in &created {
            assert_eq!(
                fs::read_to_string(h.backed_up(name)).unwrap(),
                format!("content of {}\n", name)
            );
            assert!(h.change_log().contains(&format!("Changes in {} on", name)));
        }
    }

    #[test]
    fn test_log_uses_forward_slashes_for_nested_paths() {
        let h = BackupHarness::new();
        h.write("a/b/c/deep.txt", "x\n");
        Backup::new(h.config().build()).unwrap().run_at(at(0, 0), |_| {});
        assert!(h.change_log().starts_with("Changes in a/b/c/deep.txt on 2024-06-01 10:00:00\n"));
    }

    #[test]
    fn test_backup_root_inside_source() {
        let h = BackupHarness::new();
        h.write("a.txt", "x\n");
        let inner = h.source.join("backup");
        let backup = Backup::new(BackupConfig::builder(&h.source, &inner).build()).unwrap();

        backup.run_at(at(0, 0), |_| {});
        let second = backup.run_at(at(0, 1), |_| {});

        assert_eq!(second.sync.files_examined, 1);
        assert!(inner.join("a.txt").is_file());
        assert!(!inner.join("backup").exists());
    }

    #[test]
    fn test_same_second_run_overwrites_archive() {
        let h = BackupHarness::new();
        h.write("a.txt", "1\n");
        let backup = Backup::new(h.config().build()).unwrap();
        backup.run_at(at(0, 0), |_| {});
        h.write("a.txt", "2\n");
        let report = backup.run_at(at(0, 0), |_| {});

        let archives = archive::list_archives(&backup.meta_dir()).unwrap();
        assert_eq!(archives.len(), 1);
        let path = match report.archive {
            ArchiveOutcome::Created(entry) => entry.path,
            other => panic!("expected archive, got {:?}", other),
        };
        assert_eq!(BackupHarness::archive_entry(&path, "a.txt"), b"2\n");
    }
}
