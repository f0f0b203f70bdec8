//! Best-effort capture of the four rollback areas
//!
//! No step aborts the capture: each failure becomes a [`CaptureWarning`] for
//! its area and the next step runs.

use std::time::Duration;

use sysguard_fs::NormalizedPath;
use sysguard_fs::io::{copy_file_atomic, copy_tree, write_text};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::metadata::{CaptureArea, CaptureWarning};
use crate::config::Settings;
use crate::exec::{CommandRunner, CommandSpec};
use crate::policy::PathPolicy;

const LISTING_TIMEOUT: Duration = Duration::from_secs(60);
const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(300);

/// Accumulated result of a capture.
#[derive(Debug, Default)]
pub(crate) struct CaptureOutcome {
    pub captured_paths: Vec<String>,
    pub package_count: usize,
    pub warnings: Vec<CaptureWarning>,
}

impl CaptureOutcome {
    fn warn(&mut self, area: CaptureArea, message: impl Into<String>) {
        let message = message.into();
        warn!(%area, %message, "capture step failed");
        self.warnings.push(CaptureWarning { area, message });
    }
}

pub(crate) struct Capturer<'a> {
    pub settings: &'a Settings,
    pub runner: &'a dyn CommandRunner,
    pub policy: &'a PathPolicy,
    /// The rollback point directory
    pub dir: NormalizedPath,
}

impl Capturer<'_> {
    pub fn area_dir(&self, area: CaptureArea) -> NormalizedPath {
        self.dir.join(area.dir_name())
    }

    pub fn capture_all(&self) -> CaptureOutcome {
        let mut outcome = CaptureOutcome::default();
        self.capture_configs(&mut outcome);
        self.capture_packages(&mut outcome);
        self.capture_services(&mut outcome);
        self.capture_logs(&mut outcome);
        outcome
    }

    /// Tracked configuration paths that exist and pass the policy.
    pub fn eligible_tracked_paths(&self) -> Vec<String> {
        self.settings
            .tracked_paths
            .iter()
            .filter(|p| !self.policy.is_protected(p))
            .filter(|p| self.settings.live_path(p).exists())
            .cloned()
            .collect()
    }

    fn capture_configs(&self, outcome: &mut CaptureOutcome) {
        let configs = self.area_dir(CaptureArea::Configs);
        for tracked in &self.settings.tracked_paths {
            if let Err(e) = self.policy.validate(tracked) {
                outcome.warn(CaptureArea::Configs, e.to_string());
                continue;
            }
            let live = self.settings.live_path(tracked);
            if !live.exists() {
                debug!(path = %tracked, "tracked path absent, not captured");
                continue;
            }
            match copy_tree(&live, &configs.join(tracked)) {
                Ok(stats) => {
                    debug!(path = %tracked, files = stats.files, "captured config");
                    outcome.captured_paths.push(tracked.clone());
                }
                Err(e) => outcome.warn(CaptureArea::Configs, format!("{tracked}: {e}")),
            }
        }
    }

    fn capture_packages(&self, outcome: &mut CaptureOutcome) {
        let packages = self.area_dir(CaptureArea::Packages);
        for (flag, file) in [("-Q", "all.txt"), ("-Qe", "explicit.txt"), ("-Qm", "foreign.txt")] {
            let spec = CommandSpec::new("pacman").arg(flag).timeout(LISTING_TIMEOUT);
            match self.run_to_file(&spec, &packages.join(file)) {
                Ok(stdout) if flag == "-Q" => {
                    outcome.package_count = stdout.lines().filter(|l| !l.trim().is_empty()).count();
                }
                Ok(_) => {}
                // `pacman -Qm` exits 1 when there are no foreign packages
                Err(_) if flag == "-Qm" => {
                    let _ = write_text(&packages.join(file), "");
                }
                Err(message) => outcome.warn(CaptureArea::Packages, message),
            }
        }

        let db_root = self.settings.live_path("/var/lib/pacman");
        let archive = CommandSpec::new("tar")
            .arg("-czf")
            .arg(packages.join("local-db.tar.gz").as_str())
            .arg("-C")
            .arg(db_root.as_str())
            .arg("local")
            .timeout(ARCHIVE_TIMEOUT);
        if let Err(e) = self.runner.run(&archive) {
            outcome.warn(CaptureArea::Packages, e.to_string());
        }
    }

    fn capture_services(&self, outcome: &mut CaptureOutcome) {
        let services = self.area_dir(CaptureArea::Services);
        let listings = [
            ("list-unit-files", "--state=enabled", "enabled.txt"),
            ("list-units", "--state=active", "active.txt"),
            ("list-units", "--state=failed", "failed.txt"),
        ];
        for (verb, state, file) in listings {
            let spec = CommandSpec::new("systemctl")
                .args([verb, state, "--no-legend"])
                .timeout(LISTING_TIMEOUT);
            if let Err(message) = self.run_to_file(&spec, &services.join(file)) {
                outcome.warn(CaptureArea::Services, message);
            }
        }

        let unit_root = self.settings.live_path("/etc/systemd/system");
        if !unit_root.is_dir() {
            return;
        }
        let units = services.join("units");
        for entry in WalkDir::new(unit_root.to_native()).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    outcome.warn(CaptureArea::Services, e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(unit_root.to_native()) else {
                continue;
            };
            let dest = units.join(&relative.to_string_lossy());
            if let Err(e) = copy_file_atomic(&NormalizedPath::new(entry.path()), &dest) {
                outcome.warn(CaptureArea::Services, e.to_string());
            }
        }
    }

    fn capture_logs(&self, outcome: &mut CaptureOutcome) {
        let logs = self.area_dir(CaptureArea::Logs);
        for log in &self.settings.log_files {
            let live = self.settings.live_path(log);
            if !live.is_file() {
                continue;
            }
            let name = live.file_name().unwrap_or("log").to_string();
            if let Err(e) = copy_file_atomic(&live, &logs.join(&name)) {
                outcome.warn(CaptureArea::Logs, format!("{log}: {e}"));
            }
        }

        let journal = CommandSpec::new("journalctl")
            .args(["--since", "24 hours ago", "--no-pager", "--grep"])
            .arg(&self.settings.journal_keyword)
            .timeout(LISTING_TIMEOUT);
        match self.runner.run(&journal) {
            Ok(output) => {
                if let Err(e) = write_text(&logs.join("journal-24h.log"), &output.stdout) {
                    outcome.warn(CaptureArea::Logs, e.to_string());
                }
            }
            // journalctl exits 1 when --grep matches nothing
            Err(crate::exec::ExternalError::NonZero { code: Some(1), .. }) => {
                let _ = write_text(&logs.join("journal-24h.log"), "");
            }
            Err(e) => outcome.warn(CaptureArea::Logs, e.to_string()),
        }
    }

    fn run_to_file(
        &self,
        spec: &CommandSpec,
        dest: &NormalizedPath,
    ) -> std::result::Result<String, String> {
        let output = self.runner.run(spec).map_err(|e| e.to_string())?;
        write_text(dest, &output.stdout).map_err(|e| e.to_string())?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockRunner;
    use std::fs;
    use tempfile::tempdir;

    fn settings_in(root: &std::path::Path) -> Settings {
        Settings {
            system_root: NormalizedPath::new(root.join("sys")),
            backup_root: NormalizedPath::new(root.join("backups")),
            tracked_paths: vec![
                "/etc/tlp.conf".into(),
                "/etc/X11/xorg.conf.d".into(),
                "/root/secret".into(),
            ],
            ..Settings::default()
        }
    }

    #[test]
    fn capture_aggregates_warnings_without_aborting() {
        let dir = tempdir().unwrap();
        let settings = settings_in(dir.path());
        fs::create_dir_all(dir.path().join("sys/etc/X11/xorg.conf.d")).unwrap();
        fs::write(dir.path().join("sys/etc/tlp.conf"), "TLP_ENABLE=1").unwrap();
        fs::write(dir.path().join("sys/etc/X11/xorg.conf.d/10-gpu.conf"), "Section").unwrap();

        let runner = MockRunner::new();
        runner
            .respond("pacman -Qe", "nvidia 550.78\n")
            .respond("pacman -Qm", "")
            .respond("pacman -Q", "linux 6.9.1\nnvidia 550.78\n")
            .fail("systemctl list-units --state=failed", 1, "bus error");
        let policy = PathPolicy::new();
        let capturer = Capturer {
            settings: &settings,
            runner: &runner,
            policy: &policy,
            dir: NormalizedPath::new(dir.path().join("point")),
        };

        let outcome = capturer.capture_all();

        assert_eq!(outcome.captured_paths, vec!["/etc/tlp.conf", "/etc/X11/xorg.conf.d"]);
        assert_eq!(outcome.package_count, 2);
        assert!(dir.path().join("point/configs/etc/X11/xorg.conf.d/10-gpu.conf").is_file());
        assert!(dir.path().join("point/packages/all.txt").is_file());

        let areas: Vec<_> = outcome.warnings.iter().map(|w| w.area).collect();
        assert!(areas.contains(&CaptureArea::Configs));
        assert!(areas.contains(&CaptureArea::Services));
        assert!(!areas.contains(&CaptureArea::Packages));
    }
}
