//! Shared restore primitive
//!
//! Both snapshot and rollback restores go through [`RestoreEngine`]: the live
//! file is copied aside before it is overwritten, the new content lands
//! atomically, and the permission policy is applied afterwards.

use std::time::Duration;

use chrono::Local;
use sysguard_fs::io::{copy_file_atomic, copy_tree, remove_path, set_mode};
use sysguard_fs::{CopyStats, NormalizedPath};
use tracing::{debug, warn};

use crate::Result;
use crate::config::PermissionPolicy;
use crate::exec::{CommandRunner, CommandSpec};
use crate::report::{ReloadFailure, ReloadReport};

const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);
const BOOT_TIMEOUT: Duration = Duration::from_secs(300);

/// What [`RestoreEngine::copy_with_safety_net`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyNetCopy {
    /// Where the previous live content was kept, if there was any
    pub safety_copy: Option<NormalizedPath>,
    pub bytes: u64,
    /// Non-fatal problems, e.g. a failed `chown`
    pub warnings: Vec<String>,
}

pub struct RestoreEngine<'a> {
    runner: &'a dyn CommandRunner,
    permissions: &'a PermissionPolicy,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(runner: &'a dyn CommandRunner, permissions: &'a PermissionPolicy) -> Self {
        Self {
            runner,
            permissions,
        }
    }

    /// Copy `source` over `live`, keeping the old live content first.
    ///
    /// The safety copy is `<live>.pre-restore-YYYYMMDD-HHMMSS`; an existing
    /// safety copy is never overwritten and never removed.
    pub fn copy_with_safety_net(
        &self,
        source: &NormalizedPath,
        live: &NormalizedPath,
    ) -> Result<SafetyNetCopy> {
        let mut outcome = SafetyNetCopy::default();

        if live.is_file() {
            let safety = safety_path(live);
            copy_file_atomic(live, &safety)?;
            debug!(live = %live, safety = %safety, "kept pre-restore copy");
            outcome.safety_copy = Some(safety);
        }

        outcome.bytes = copy_file_atomic(source, live)?;
        outcome.warnings = self.apply_permissions(live)?;
        Ok(outcome)
    }

    /// Apply the mode in-process and the owner through `chown`.
    ///
    /// Returns warnings; only a failure to set the mode is an error.
    pub fn apply_permissions(&self, live: &NormalizedPath) -> Result<Vec<String>> {
        set_mode(live, self.permissions.mode_bits()?)?;
        Ok(self.apply_owner(live).into_iter().collect())
    }

    /// `chown` one path; a failure is returned as a warning message.
    pub fn apply_owner(&self, live: &NormalizedPath) -> Option<String> {
        let chown = CommandSpec::new("chown")
            .arg(&self.permissions.owner)
            .arg(live.as_str())
            .timeout(RELOAD_TIMEOUT);
        match self.runner.run(&chown) {
            Ok(_) => None,
            Err(e) => {
                warn!(path = %live, error = %e, "ownership not applied");
                Some(format!("ownership not applied to {live}: {e}"))
            }
        }
    }

    /// Delete `target` (file or tree) and copy `source` in its place.
    pub fn replace_tree(
        &self,
        source: &NormalizedPath,
        target: &NormalizedPath,
    ) -> Result<CopyStats> {
        remove_path(target)?;
        copy_tree(source, target).map_err(Into::into)
    }

    /// Service-manager and udev reloads. Best-effort, never retried.
    pub fn trigger_reload(&self) -> ReloadReport {
        let commands = [
            CommandSpec::new("systemctl").arg("daemon-reload"),
            CommandSpec::new("udevadm").args(["control", "--reload-rules"]),
            CommandSpec::new("udevadm").arg("trigger"),
        ];
        self.run_best_effort(&commands, RELOAD_TIMEOUT)
    }

    /// Regenerate the boot loader config and the initial ramdisks.
    pub fn regenerate_boot(&self) -> ReloadReport {
        let commands = [
            CommandSpec::new("grub-mkconfig").args(["-o", "/boot/grub/grub.cfg"]),
            CommandSpec::new("mkinitcpio").arg("-P"),
        ];
        self.run_best_effort(&commands, BOOT_TIMEOUT)
    }

    fn run_best_effort(&self, commands: &[CommandSpec], limit: Duration) -> ReloadReport {
        let mut report = ReloadReport::default();
        for spec in commands {
            let spec = spec.clone().timeout(limit);
            report.attempted.push(spec.command_line());
            if let Err(e) = self.runner.run(&spec) {
                warn!(command = %spec, error = %e, "reload step failed");
                report.failed.push(ReloadFailure {
                    command: spec.command_line(),
                    message: e.to_string(),
                });
            }
        }
        report
    }
}

/// First free `<live>.pre-restore-<timestamp>[-N]` path.
pub fn safety_path(live: &NormalizedPath) -> NormalizedPath {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let base = live.with_suffix(&format!(".pre-restore-{stamp}"));
    free_variant(base)
}

/// `base` if unused, else the first unused `base-N`.
pub(crate) fn free_variant(base: NormalizedPath) -> NormalizedPath {
    let mut candidate = base.clone();
    let mut n = 1u32;
    while candidate.exists() {
        candidate = base.with_suffix(&format!("-{n}"));
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockRunner;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn existing_target_is_kept_aside() {
        let dir = tempdir().unwrap();
        let source = NormalizedPath::new(dir.path().join("backup.conf"));
        let live = NormalizedPath::new(dir.path().join("example.conf"));
        fs::write(source.to_native(), "A=1").unwrap();
        fs::write(live.to_native(), "A=2").unwrap();

        let runner = MockRunner::new();
        let policy = PermissionPolicy::default();
        let outcome = RestoreEngine::new(&runner, &policy)
            .copy_with_safety_net(&source, &live)
            .unwrap();

        let safety = outcome.safety_copy.unwrap();
        assert!(safety.as_str().contains("example.conf.pre-restore-"));
        assert_eq!(fs::read_to_string(safety.to_native()).unwrap(), "A=2");
        assert_eq!(fs::read_to_string(live.to_native()).unwrap(), "A=1");
        assert!(runner.was_called("chown root:root"));
    }

    #[test]
    fn absent_target_needs_no_safety_copy() {
        let dir = tempdir().unwrap();
        let source = NormalizedPath::new(dir.path().join("backup.conf"));
        fs::write(source.to_native(), "A=1").unwrap();
        let live = NormalizedPath::new(dir.path().join("etc/new.conf"));

        let runner = MockRunner::new();
        let policy = PermissionPolicy::default();
        let outcome = RestoreEngine::new(&runner, &policy)
            .copy_with_safety_net(&source, &live)
            .unwrap();

        assert!(outcome.safety_copy.is_none());
        assert_eq!(outcome.bytes, 3);
    }

    #[test]
    fn safety_copies_never_collide() {
        let dir = tempdir().unwrap();
        let live = NormalizedPath::new(dir.path().join("tlp.conf"));
        fs::write(live.to_native(), "x").unwrap();

        let first = safety_path(&live);
        fs::write(first.to_native(), "kept").unwrap();
        let second = safety_path(&live);

        assert_ne!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn permission_policy_is_applied() {
        let dir = tempdir().unwrap();
        let source = NormalizedPath::new(dir.path().join("b"));
        fs::write(source.to_native(), "x").unwrap();
        sysguard_fs::io::set_mode(&source, 0o600).unwrap();
        let live = NormalizedPath::new(dir.path().join("l"));

        let runner = MockRunner::new();
        let policy = PermissionPolicy::default();
        RestoreEngine::new(&runner, &policy)
            .copy_with_safety_net(&source, &live)
            .unwrap();

        assert_eq!(sysguard_fs::io::mode_of(&live).unwrap(), 0o644);
    }

    #[test]
    fn chown_failure_is_only_a_warning() {
        let dir = tempdir().unwrap();
        let source = NormalizedPath::new(dir.path().join("b"));
        fs::write(source.to_native(), "x").unwrap();
        let live = NormalizedPath::new(dir.path().join("l"));

        let runner = MockRunner::new();
        runner.fail("chown", 1, "operation not permitted");
        let policy = PermissionPolicy::default();
        let outcome = RestoreEngine::new(&runner, &policy)
            .copy_with_safety_net(&source, &live)
            .unwrap();

        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn reload_failures_are_reported_not_raised() {
        let runner = MockRunner::new();
        runner.fail("udevadm trigger", 1, "no udev");
        let policy = PermissionPolicy::default();

        let report = RestoreEngine::new(&runner, &policy).trigger_reload();

        assert_eq!(report.attempted.len(), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].command, "udevadm trigger");
    }

    #[test]
    fn replace_tree_drops_stale_entries() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("captured");
        let target = dir.path().join("live");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("20-gpu.conf"), "captured").unwrap();
        fs::write(target.join("99-stale.conf"), "stale").unwrap();

        let runner = MockRunner::new();
        let policy = PermissionPolicy::default();
        RestoreEngine::new(&runner, &policy)
            .replace_tree(&NormalizedPath::new(&source), &NormalizedPath::new(&target))
            .unwrap();

        assert!(target.join("20-gpu.conf").is_file());
        assert!(!target.join("99-stale.conf").exists());
    }
}
