//! Tests for per-file snapshots against a temporary system root

use std::fs;

use pretty_assertions::assert_eq;
use rstest::rstest;
use sysguard_core::exec::MockRunner;
use sysguard_core::ledger::StoreLock;
use sysguard_core::report::ItemStatus;
use sysguard_core::snapshot::{FORMAT_VERSION, SnapshotStore};
use sysguard_core::{AssumeNo, AssumeYes, Error, OperatorContext};
use sysguard_fs::compute_content_checksum;
use sysguard_test_utils::TestSystem;

fn ctx() -> OperatorContext {
    OperatorContext::new("tester")
}

mod create_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entry_checksum_is_sha256_of_content() {
        let system = TestSystem::new().with_mappings(&["/etc/example.conf"]);
        system.write_live("/etc/example.conf", "A=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);

        let report = store.create("baseline", &ctx()).unwrap();

        let metadata = store.load_metadata(&report.id).unwrap();
        assert_eq!(metadata.format_version, FORMAT_VERSION);
        assert_eq!(metadata.files.len(), 1);
        assert_eq!(metadata.files[0].checksum, compute_content_checksum("A=1"));
        assert_eq!(metadata.files[0].size_bytes, 3);
        assert_eq!(metadata.operator_user, "tester");

        let dir = store.snapshot_dir(&report.id).to_native();
        assert_eq!(fs::read_to_string(dir.join("files/etc/example.conf")).unwrap(), "A=1");
        assert_eq!(fs::read_to_string(dir.join("VERSION")).unwrap().trim(), "2");
        assert!(dir.join("SUMMARY.txt").is_file());
    }

    #[test]
    fn test_missing_and_protected_sources_are_skipped() {
        let system = TestSystem::new().with_mappings(&[
            "/etc/tlp.conf",
            "/etc/shadow",
            "/etc/modprobe.d/nvidia.conf",
        ]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        system.write_live("/etc/shadow", "root:*:19000::::::");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);

        let report = store.create("partial", &ctx()).unwrap();

        let counts = report.counts();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.skipped, 2);
        assert_eq!(counts.failed, 0);

        let shadow = report.items.iter().find(|i| i.path == "/etc/shadow").unwrap();
        assert_eq!(shadow.status, ItemStatus::Skipped);
        assert!(shadow.detail.as_deref().unwrap().contains("protected pattern"));

        let mirror = store.snapshot_dir(&report.id).join("files").to_native();
        assert!(!mirror.join("etc/shadow").exists());
        assert!(store.validate(&report.id).unwrap().is_valid());
    }

    #[test]
    fn test_two_creates_share_checksums_but_not_ids() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf", "/etc/mkinitcpio.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        system.write_live("/etc/mkinitcpio.conf", "MODULES=(nvidia)");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);

        let first = store.create("one", &ctx()).unwrap();
        let second = store.create("two", &ctx()).unwrap();

        assert_ne!(first.id, second.id);
        let a = store.load_metadata(&first.id).unwrap();
        let b = store.load_metadata(&second.id).unwrap();
        let sums = |m: &sysguard_core::SnapshotMetadata| {
            m.files.iter().map(|f| f.checksum.clone()).collect::<Vec<_>>()
        };
        assert_eq!(sums(&a), sums(&b));
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);

        let report = store.create("preview", &ctx().with_dry_run(true)).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.counts().succeeded, 1);
        assert!(!system.backup_root().exists());
    }

    #[test]
    fn test_second_run_fails_fast_when_store_is_locked() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);

        let _held = StoreLock::acquire(&system.settings().backup_root).unwrap();
        let result = store.create("blocked", &ctx());

        assert!(matches!(result, Err(Error::StoreBusy { .. })));
        assert!(store.list().unwrap().is_empty());
    }
}

mod restore_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[rstest]
    #[case("/etc/sudoers")]
    #[case("/etc/gshadow")]
    #[case("/root/.bashrc")]
    #[case("/home/alice/.config/autostart.conf")]
    fn test_restore_skips_protected_source_in_metadata(#[case] protected: &str) {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("baseline", &ctx()).unwrap();

        // Point the recorded entry at a protected location
        let metadata_path = store.snapshot_dir(&created.id).join("metadata.json").to_native();
        let text = fs::read_to_string(&metadata_path).unwrap();
        let mut doc: Value = serde_json::from_str(&text).unwrap();
        doc["files"][0]["source_path"] = Value::from(protected);
        fs::write(&metadata_path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
        system.write_live(protected, "untouched");

        let report = store.restore(&created.id, &ctx(), &AssumeYes).unwrap();

        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].status, ItemStatus::Skipped);
        assert_eq!(report.counts().succeeded, 0);
        assert_eq!(system.read_live(protected), "untouched");
        assert!(!runner.was_called("udevadm"));
    }

    #[test]
    fn test_restore_rewrites_content_and_keeps_safety_copy() {
        let system = TestSystem::new().with_mappings(&["/etc/example.conf"]);
        system.write_live("/etc/example.conf", "A=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("baseline", &ctx()).unwrap();

        system.write_live("/etc/example.conf", "A=2");
        let report = store.restore(&created.id, &ctx(), &AssumeYes).unwrap();

        assert_eq!(report.counts().succeeded, 1);
        assert_eq!(system.read_live("/etc/example.conf"), "A=1");

        let copies = system.siblings_with("/etc/example.conf", ".pre-restore-");
        assert_eq!(copies.len(), 1);
        assert_eq!(fs::read_to_string(&copies[0]).unwrap(), "A=2");
        assert_eq!(report.safety_copies.len(), 1);

        assert!(runner.was_called("systemctl daemon-reload"));
        assert!(runner.was_called("udevadm control --reload-rules"));
        assert!(runner.was_called("chown root:root"));
    }

    #[test]
    fn test_restore_recreates_deleted_file_without_safety_copy() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("baseline", &ctx()).unwrap();

        fs::remove_file(system.live("/etc/tlp.conf")).unwrap();
        let report = store.restore(&created.id, &ctx(), &AssumeYes).unwrap();

        assert!(report.safety_copies.is_empty());
        assert_eq!(system.read_live("/etc/tlp.conf"), "TLP_ENABLE=1");
    }

    #[test]
    fn test_tampered_snapshot_fails_validation_and_restores_nothing() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf", "/etc/mkinitcpio.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        system.write_live("/etc/mkinitcpio.conf", "MODULES=()");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("baseline", &ctx()).unwrap();

        let copy = store
            .snapshot_dir(&created.id)
            .join("files/etc/tlp.conf")
            .to_native();
        fs::write(&copy, "TLP_ENABLE=0").unwrap();
        system.write_live("/etc/tlp.conf", "changed");

        let validation = store.validate(&created.id).unwrap();
        assert!(!validation.is_valid());
        assert_eq!(validation.files_checked, 2);
        assert_eq!(validation.errors.len(), 1);
        assert!(validation.errors[0].contains("/etc/tlp.conf"));

        let result = store.restore(&created.id, &ctx(), &AssumeYes);
        assert!(matches!(result, Err(Error::IntegrityMismatch { .. })));
        assert_eq!(system.read_live("/etc/tlp.conf"), "changed");
    }

    #[test]
    fn test_restore_needs_confirmation_or_force() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("baseline", &ctx()).unwrap();
        system.write_live("/etc/tlp.conf", "changed");

        let declined = store.restore(&created.id, &ctx(), &AssumeNo);
        assert!(matches!(declined, Err(Error::Cancelled { .. })));
        assert_eq!(system.read_live("/etc/tlp.conf"), "changed");

        store
            .restore(&created.id, &ctx().with_force(true), &AssumeNo)
            .unwrap();
        assert_eq!(system.read_live("/etc/tlp.conf"), "TLP_ENABLE=1");
    }

    #[test]
    fn test_dry_run_restore_reports_without_touching_files() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("baseline", &ctx()).unwrap();
        system.write_live("/etc/tlp.conf", "changed");
        let calls_before = runner.calls().len();

        let report = store
            .restore(&created.id, &ctx().with_dry_run(true), &AssumeNo)
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.counts().succeeded, 1);
        assert_eq!(system.read_live("/etc/tlp.conf"), "changed");
        assert!(system.siblings_with("/etc/tlp.conf", ".pre-restore-").is_empty());
        assert_eq!(runner.calls().len(), calls_before);
    }

    #[test]
    fn test_restore_paths_limits_to_prefix() {
        let system = TestSystem::new().with_mappings(&[
            "/etc/X11/xorg.conf.d/10-gpu.conf",
            "/etc/tlp.conf",
        ]);
        system.write_live("/etc/X11/xorg.conf.d/10-gpu.conf", "Section \"Device\"\nEndSection\n");
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("baseline", &ctx()).unwrap();

        system.write_live("/etc/X11/xorg.conf.d/10-gpu.conf", "broken");
        system.write_live("/etc/tlp.conf", "changed");
        let report = store
            .restore_paths(&created.id, "/etc/X11", &ctx(), &AssumeYes)
            .unwrap();

        assert_eq!(report.items.len(), 1);
        system.assert_live_contains("/etc/X11/xorg.conf.d/10-gpu.conf", "EndSection");
        assert_eq!(system.read_live("/etc/tlp.conf"), "changed");
    }

    #[test]
    fn test_unknown_and_traversal_ids_are_not_found() {
        let system = TestSystem::new();
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);

        for id in ["snap-missing", "..", "../logs", ""] {
            let result = store.restore(id, &ctx(), &AssumeYes);
            assert!(
                matches!(result, Err(Error::SnapshotNotFound { .. })),
                "{id:?} should be not found"
            );
        }
    }
}

mod format_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[test]
    fn test_format_1_snapshot_is_migrated_on_restore() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("old", &ctx()).unwrap();

        // Rewrite the snapshot the way format 1 stored it
        let dir = store.snapshot_dir(&created.id).to_native();
        let mut doc: Value =
            serde_json::from_str(&fs::read_to_string(dir.join("metadata.json")).unwrap()).unwrap();
        doc["format_version"] = Value::from("1");
        let checksum = doc["files"][0]["checksum"].as_str().unwrap().to_string();
        doc["files"][0]["checksum"] = Value::from(format!("sha256:{checksum}"));
        doc["files"][0].as_object_mut().unwrap().remove("size_bytes");
        fs::write(dir.join("metadata.json"), serde_json::to_string_pretty(&doc).unwrap()).unwrap();
        fs::write(dir.join("VERSION"), "1\n").unwrap();

        assert!(store.validate(&created.id).unwrap().is_valid());

        system.write_live("/etc/tlp.conf", "changed");
        let report = store.restore(&created.id, &ctx(), &AssumeYes).unwrap();

        assert_eq!(report.migrated_from.as_deref(), Some("1"));
        assert_eq!(system.read_live("/etc/tlp.conf"), "TLP_ENABLE=1");
        let migrated = store.load_metadata(&created.id).unwrap();
        assert_eq!(migrated.format_version, "2");
        assert_eq!(migrated.files[0].checksum, checksum);
        assert_eq!(migrated.files[0].size_bytes, 12);
        assert_eq!(fs::read_to_string(dir.join("VERSION")).unwrap().trim(), "2");
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("future", &ctx()).unwrap();

        let dir = store.snapshot_dir(&created.id).to_native();
        let mut doc: Value =
            serde_json::from_str(&fs::read_to_string(dir.join("metadata.json")).unwrap()).unwrap();
        doc["format_version"] = Value::from("9");
        fs::write(dir.join("metadata.json"), doc.to_string()).unwrap();
        fs::write(dir.join("VERSION"), "9\n").unwrap();

        let validation = store.validate(&created.id).unwrap();
        assert!(!validation.is_valid());
        system.write_live("/etc/tlp.conf", "changed");
        assert!(matches!(
            store.restore(&created.id, &ctx(), &AssumeYes),
            Err(Error::UnsupportedFormatVersion { found, .. }) if found == "9"
        ));
        assert_eq!(system.read_live("/etc/tlp.conf"), "changed");
    }
}

mod lookup_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_entry_skips_tampered_copies() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "v1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let older = store.create("older", &ctx()).unwrap();
        system.write_live("/etc/tlp.conf", "v2");
        let newer = store.create("newer", &ctx()).unwrap();

        let (id, _) = store.find_entry("/etc/tlp.conf").unwrap().unwrap();
        assert_eq!(id, newer.id);

        fs::write(
            store.snapshot_dir(&newer.id).join("files/etc/tlp.conf").to_native(),
            "tampered",
        )
        .unwrap();
        let (id, entry) = store.find_entry("/etc/tlp.conf").unwrap().unwrap();
        assert_eq!(id, older.id);
        assert_eq!(entry.checksum, compute_content_checksum("v1"));
        assert!(store.find_entry("/etc/never-mapped").unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_snapshot() {
        let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
        system.write_live("/etc/tlp.conf", "v1");
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let created = store.create("gone soon", &ctx()).unwrap();

        let report = store.delete(&created.id, &ctx(), &AssumeYes).unwrap();

        assert!(report.removed);
        assert!(!store.snapshot_dir(&created.id).exists());
        assert!(store.list().unwrap().is_empty());
    }
}
