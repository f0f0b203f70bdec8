//! Cross-component tests: settings files, stores and logs working together.

use std::fs;

use pretty_assertions::assert_eq;
use sysguard_core::{
    AssumeYes, ConfigResolver, MockRunner, OperatorContext, RollbackStore, SnapshotStore,
};
use sysguard_fs::compute_content_checksum;
use sysguard_test_utils::TestSystem;

fn ctx() -> OperatorContext {
    OperatorContext::new("integration")
}

#[test]
fn settings_file_round_trips_through_the_resolver() {
    let system = TestSystem::new()
        .with_mappings(&["/etc/tlp.conf", "/etc/X11/xorg.conf.d/10-gpu.conf"])
        .with_tracked(&["/etc/tlp.conf"])
        .with_retention(4);
    let config = system.write_settings_file();

    let resolved = ConfigResolver::new()
        .with_global_config_dir(system.root().join("global"))
        .with_file(config)
        .resolve()
        .unwrap();

    assert_eq!(resolved.system_root, system.settings().system_root);
    assert_eq!(resolved.backup_root, system.settings().backup_root);
    assert_eq!(resolved.retention, 4);
    assert_eq!(resolved.mappings, system.settings().mappings);
    assert_eq!(resolved.tracked_paths, vec!["/etc/tlp.conf"]);
}

#[test]
fn resolved_settings_drive_a_snapshot() {
    let system = TestSystem::new().with_mappings(&["/etc/tlp.conf"]);
    system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
    let config = system.write_settings_file();
    let settings = ConfigResolver::new()
        .with_global_config_dir(system.root().join("global"))
        .with_file(config)
        .resolve()
        .unwrap();
    let runner = MockRunner::new();

    let store = SnapshotStore::new(&settings, &runner);
    let report = store.create("from file", &ctx()).unwrap();
    let metadata = store.load_metadata(&report.id).unwrap();

    assert_eq!(metadata.files.len(), 1);
    assert_eq!(
        metadata.files[0].checksum,
        compute_content_checksum("TLP_ENABLE=1")
    );
    assert_eq!(metadata.operator_user, "integration");
}

#[test]
fn operations_log_records_every_mutation() {
    let system = TestSystem::new()
        .with_mappings(&["/etc/tlp.conf"])
        .with_tracked(&["/etc/tlp.conf"]);
    system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
    let runner = MockRunner::new();
    let snapshots = SnapshotStore::new(system.settings(), &runner);
    let rollback = RollbackStore::new(system.settings(), &runner);

    let snapshot = snapshots.create("logged", &ctx()).unwrap();
    snapshots.restore(&snapshot.id, &ctx(), &AssumeYes).unwrap();
    let point = rollback.create("logged point", "", &ctx()).unwrap();
    snapshots.delete(&snapshot.id, &ctx(), &AssumeYes).unwrap();

    let log = fs::read_to_string(system.settings().operations_log().to_native()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert!(lines.iter().any(|l| l.contains(&format!("created {}", snapshot.id))));
    assert!(lines.iter().any(|l| l.contains(&format!("restored {}", snapshot.id))));
    assert!(lines.iter().any(|l| l.contains(&format!("created {}", point.id))));
    assert!(lines.iter().any(|l| l.contains(&format!("deleted {}", snapshot.id))));
}

#[test]
fn dry_runs_leave_the_backup_root_untouched() {
    let system = TestSystem::new()
        .with_mappings(&["/etc/tlp.conf"])
        .with_tracked(&["/etc/tlp.conf"]);
    system.write_live("/etc/tlp.conf", "TLP_ENABLE=1");
    let runner = MockRunner::new();
    let dry = ctx().with_dry_run(true);

    SnapshotStore::new(system.settings(), &runner)
        .create("preview", &dry)
        .unwrap();
    RollbackStore::new(system.settings(), &runner)
        .create("preview", "", &dry)
        .unwrap();

    let settings = system.settings();
    assert!(!settings.snapshots_dir().exists());
    assert!(!settings.rollback_dir().exists());
    assert!(!settings.operations_log().exists());
}
