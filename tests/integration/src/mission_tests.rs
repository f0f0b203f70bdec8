//! Scenario tests: the failure stories sysguard exists for, end to end.
//!
//! Every external command goes through a [`MockRunner`]; files live under a
//! [`TestSystem`] root.

use std::fs;

use pretty_assertions::assert_eq;
use sysguard_core::{
    AssumeYes, Error, FailureClass, Interrupt, MockRunner, OperatorContext, RecoveryArgs,
    RecoveryRegistry, RollbackStore, SnapshotStore, Verdict,
};
use sysguard_test_utils::TestSystem;

const TLP: &str = "/etc/tlp.conf";
const GPU_CONF: &str = "/etc/X11/xorg.conf.d/10-gpu.conf";
const GOOD_XORG: &str = "Section \"OutputClass\"\n    Driver \"nvidia\"\nEndSection\n";

fn ctx() -> OperatorContext {
    OperatorContext::new("operator")
}

fn laptop() -> TestSystem {
    let system = TestSystem::new()
        .with_mappings(&[TLP, GPU_CONF])
        .with_tracked(&[TLP, "/etc/X11/xorg.conf.d"]);
    system.write_live(TLP, "TLP_ENABLE=1");
    system.write_live(GPU_CONF, GOOD_XORG);
    system
}

// =============================================================================
// S1: a bad edit is undone from a snapshot
// =============================================================================

mod s1_snapshot_undo {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bad_edit_is_reverted_and_kept_aside() {
        let system = laptop();
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let snapshot = store.create("before tuning", &ctx()).unwrap();

        system.write_live(TLP, "TLP_ENABLE=0");
        let report = store.restore(&snapshot.id, &ctx(), &AssumeYes).unwrap();

        assert_eq!(report.counts().succeeded, 2);
        assert_eq!(system.read_live(TLP), "TLP_ENABLE=1");
        let kept = system.siblings_with(TLP, ".pre-restore");
        assert_eq!(kept.len(), 1);
        assert_eq!(fs::read_to_string(&kept[0]).unwrap(), "TLP_ENABLE=0");
        assert!(runner.was_called("systemctl daemon-reload"));
    }

    #[test]
    fn scoped_restore_leaves_other_files_alone() {
        let system = laptop();
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let snapshot = store.create("before tuning", &ctx()).unwrap();

        system.write_live(TLP, "TLP_ENABLE=0");
        system.write_live(GPU_CONF, "broken");
        let report = store
            .restore_paths(&snapshot.id, "/etc/X11", &ctx(), &AssumeYes)
            .unwrap();

        assert_eq!(report.counts().succeeded, 1);
        assert_eq!(system.read_live(GPU_CONF), GOOD_XORG);
        assert_eq!(system.read_live(TLP), "TLP_ENABLE=0");
    }
}

// =============================================================================
// S2: a damaged newest snapshot does not block recovery
// =============================================================================

mod s2_damaged_snapshot {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_corruption_falls_back_to_older_intact_snapshot() {
        let system = laptop();
        let runner = MockRunner::new();
        let store = SnapshotStore::new(system.settings(), &runner);
        let older = store.create("known good", &ctx()).unwrap();

        system.write_live(TLP, "TLP_ENABLE=1\nTLP_DEFAULT_MODE=BAT");
        let newer = store.create("after edit", &ctx()).unwrap();
        let newer_entry = store.load_metadata(&newer.id).unwrap().files[0].clone();
        fs::write(
            store.backup_file(&newer.id, &newer_entry).to_native(),
            "bit rot",
        )
        .unwrap();

        assert!(matches!(
            store.restore(&newer.id, &ctx(), &AssumeYes),
            Err(Error::IntegrityMismatch { .. })
        ));

        system.write_live(TLP, "\u{0}\u{0}");
        let outcome = RecoveryRegistry::new(system.settings(), &runner)
            .execute(FailureClass::ConfigCorruption, &RecoveryArgs::path(TLP), &ctx())
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Success);
        assert_eq!(system.read_live(TLP), "TLP_ENABLE=1");
        let restored = outcome.steps[1].detail.clone().unwrap();
        assert!(restored.contains(&older.id), "{restored}");
    }
}

// =============================================================================
// S3: a failed update is rolled back, and the rollback can be undone
// =============================================================================

mod s3_rollback_round_trip {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rollback_then_undo_with_emergency_point() {
        let system = laptop();
        let runner = MockRunner::new();
        let store = RollbackStore::new(system.settings(), &runner);
        let before = store.create("before update", "", &ctx()).unwrap();

        system.write_live(GPU_CONF, "Section \"Device\"\n");
        system.write_live("/etc/X11/xorg.conf.d/20-extra.conf", "# added by update");

        let report = store.restore(&before.id, &ctx(), &AssumeYes).unwrap();
        assert_eq!(system.read_live(GPU_CONF), GOOD_XORG);
        assert!(!system.live("/etc/X11/xorg.conf.d/20-extra.conf").exists());

        let emergency = report.emergency_point.unwrap();
        store.restore(&emergency, &ctx(), &AssumeYes).unwrap();
        assert_eq!(system.read_live(GPU_CONF), "Section \"Device\"\n");
        assert!(system.live("/etc/X11/xorg.conf.d/20-extra.conf").exists());
        assert_eq!(store.last_restored().unwrap(), Some(emergency));
    }

    #[test]
    fn failed_recovery_then_rollback() {
        let system = laptop();
        let runner = MockRunner::new();
        runner
            .fail("systemctl restart NetworkManager", 1, "unit not found")
            .fail("nmcli", 10, "networking unavailable")
            .fail("ping", 2, "unknown host");
        let store = RollbackStore::new(system.settings(), &runner);
        let point = store.create("before network change", "", &ctx()).unwrap();
        system.write_live(TLP, "TLP_ENABLE=0");

        let outcome = RecoveryRegistry::new(system.settings(), &runner)
            .execute(FailureClass::Network, &RecoveryArgs::default(), &ctx())
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Failed);

        store.restore(&point.id, &ctx(), &AssumeYes).unwrap();
        assert_eq!(system.read_live(TLP), "TLP_ENABLE=1");
    }
}

// =============================================================================
// S4: recovery history and interrupts
// =============================================================================

mod s4_recovery_history {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn recovery_log_accumulates_runs() {
        let system = laptop();
        let runner = MockRunner::new();
        let registry = RecoveryRegistry::new(system.settings(), &runner);

        registry
            .execute(FailureClass::VendorTools, &RecoveryArgs::default(), &ctx())
            .unwrap();
        registry
            .execute(
                FailureClass::ServiceStart,
                &RecoveryArgs::service("tlp.service"),
                &ctx(),
            )
            .unwrap();

        let log = fs::read_to_string(registry.log_path().to_native()).unwrap();
        assert!(log.contains("vendor-tools"));
        assert!(log.contains("service-start"));
        assert!(log.contains("(operator operator)"));
    }

    #[test]
    fn interrupt_before_start_runs_nothing() {
        let system = laptop();
        let runner = MockRunner::new();
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let outcome = RecoveryRegistry::new(system.settings(), &runner)
            .execute(
                FailureClass::PowerManagement,
                &RecoveryArgs::default(),
                &ctx().with_interrupt(interrupt),
            )
            .unwrap();

        assert!(outcome.interrupted);
        assert_eq!(outcome.steps_succeeded, 0);
        assert_eq!(outcome.verdict, Verdict::Failed);
        assert!(runner.calls().is_empty());
    }
}
