//! Whole-subsystem rollback points
//!
//! A rollback point captures tracked configuration trees, package listings,
//! service state and logs into `<backup_root>/rollback/<id>/`. Listing reads
//! the shared index only. Restore is all-or-nothing: any integrity problem
//! aborts before the first change.

mod capture;
mod metadata;

pub use metadata::{
    CaptureArea, CaptureWarning, ContentsFlags, HardwareInfo, RollbackPoint,
    parse_display_controllers,
};

use std::fs;

use chrono::{Local, Utc};
use sysguard_fs::io::remove_path;
use sysguard_fs::{ConfigStore, NormalizedPath, StorePath};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::context::{Confirm, HostFacts, OperatorContext, require_confirmation};
use crate::exec::CommandRunner;
use crate::ledger::{AppendLog, RollbackIndex, RollbackIndexEntry, StoreLock};
use crate::policy::PathPolicy;
use crate::report::{DeleteReport, ItemReport, RestoreReport};
use crate::restore::RestoreEngine;
use crate::{Error, Result};

use capture::Capturer;

pub struct RollbackStore<'a> {
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    policy: PathPolicy,
    log: AppendLog,
}

impl<'a> RollbackStore<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn CommandRunner) -> Self {
        Self {
            settings,
            runner,
            policy: PathPolicy::new(),
            log: AppendLog::new(settings.operations_log(), "rollback"),
        }
    }

    pub fn point_dir(&self, id: &str) -> NormalizedPath {
        self.settings.rollback_dir().join(id)
    }

    fn index_path(&self) -> NormalizedPath {
        self.settings
            .rollback_dir()
            .join(StorePath::RollbackIndex.as_str())
    }

    /// Capture a new rollback point and apply retention.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        ctx: &OperatorContext,
    ) -> Result<RollbackPoint> {
        let _lock = if ctx.dry_run {
            None
        } else {
            Some(StoreLock::acquire(&self.settings.backup_root)?)
        };
        self.create_unlocked(name, description, false, &[], ctx)
    }

    fn create_unlocked(
        &self,
        name: &str,
        description: &str,
        emergency: bool,
        protected: &[&str],
        ctx: &OperatorContext,
    ) -> Result<RollbackPoint> {
        let id = new_id();
        let dir = self.point_dir(&id);
        let capturer = Capturer {
            settings: self.settings,
            runner: self.runner,
            policy: &self.policy,
            dir: dir.clone(),
        };

        let mut point = RollbackPoint {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            emergency,
            system_info: HostFacts::collect(self.runner, ctx),
            hardware_info: HardwareInfo::collect(self.settings, self.runner),
            contents: ContentsFlags::default(),
            captured_paths: Vec::new(),
            package_count: 0,
            capture_warnings: Vec::new(),
        };

        if ctx.dry_run {
            point.captured_paths = capturer.eligible_tracked_paths();
            info!(%id, paths = point.captured_paths.len(), "rollback dry run");
            return Ok(point);
        }

        for area in CaptureArea::ALL {
            fs::create_dir_all(capturer.area_dir(area).to_native())?;
        }
        let outcome = capturer.capture_all();
        point.contents = ContentsFlags::from_warnings(&outcome.warnings);
        point.captured_paths = outcome.captured_paths;
        point.package_count = outcome.package_count;
        point.capture_warnings = outcome.warnings;

        ConfigStore::new().save(&dir.join(StorePath::Metadata.as_str()), &point)?;

        let entry = RollbackIndexEntry {
            id: id.clone(),
            name: name.to_string(),
            created_at: point.created_at,
            emergency,
        };
        let retention = self.settings.retention;
        let evicted = RollbackIndex::update(&self.index_path(), |index| {
            index.push(entry);
            Ok(index.evict_beyond(retention, protected))
        })?;
        for old in &evicted {
            remove_path(&self.point_dir(&old.id))?;
            info!(id = %old.id, "evicted rollback point");
            self.log.info(&format!("evicted {} (retention {retention})", old.id))?;
        }

        info!(%id, warnings = point.capture_warnings.len(), "rollback point created");
        self.log.info(&format!(
            "created {id} '{name}' by {} with {} capture warning(s){}",
            ctx.operator,
            point.capture_warnings.len(),
            if emergency { " (emergency)" } else { "" }
        ))?;
        Ok(point)
    }

    /// Index entries, newest first.
    pub fn list(&self) -> Result<Vec<RollbackIndexEntry>> {
        Ok(RollbackIndex::load(&self.index_path())?.newest_first())
    }

    pub fn last_restored(&self) -> Result<Option<String>> {
        Ok(RollbackIndex::load(&self.index_path())?.last_restored)
    }

    /// Full metadata of one point.
    pub fn get(&self, id: &str) -> Result<RollbackPoint> {
        self.indexed(id)?;
        let path = self.point_dir(id).join(StorePath::Metadata.as_str());
        if !path.is_file() {
            return Err(Error::RollbackNotFound { id: id.to_string() });
        }
        Ok(ConfigStore::new().load(&path)?)
    }

    /// Fail-fast check of everything a restore relies on.
    pub fn verify(&self, id: &str) -> Result<RollbackPoint> {
        self.indexed(id)?;
        let dir = self.point_dir(id);
        let integrity = |detail: String| Error::IntegrityMismatch {
            id: id.to_string(),
            detail,
        };

        for area in CaptureArea::ALL {
            if !dir.join(area.dir_name()).is_dir() {
                return Err(integrity(format!("{area} directory missing")));
            }
        }
        let point: RollbackPoint = ConfigStore::new()
            .load(&dir.join(StorePath::Metadata.as_str()))
            .map_err(|e| integrity(format!("metadata unreadable: {e}")))?;
        if point.id != id {
            return Err(integrity(format!("metadata belongs to {}", point.id)));
        }

        let configs = dir.join(CaptureArea::Configs.dir_name());
        for path in &point.captured_paths {
            if fs::symlink_metadata(configs.join(path).to_native()).is_err() {
                return Err(integrity(format!("captured {path} missing")));
            }
        }
        Ok(point)
    }

    /// Replace every captured configuration path with its captured copy.
    ///
    /// An emergency rollback point of the current state is taken first, so
    /// the restore can itself be undone.
    pub fn restore(
        &self,
        id: &str,
        ctx: &OperatorContext,
        confirm: &dyn Confirm,
    ) -> Result<RestoreReport> {
        self.indexed(id)?;
        require_confirmation(
            ctx,
            confirm,
            "rollback restore",
            &format!("Replace tracked configuration with rollback point {id}?"),
        )?;
        let _lock = if ctx.dry_run {
            None
        } else {
            Some(StoreLock::acquire(&self.settings.backup_root)?)
        };

        let point = match self.verify(id) {
            Ok(point) => point,
            Err(e) => {
                if !ctx.dry_run {
                    self.log.error(&format!("refused restore of {id}: {e}"))?;
                }
                return Err(e);
            }
        };

        let config_warnings: Vec<_> = point
            .warnings_for(CaptureArea::Configs)
            .map(|w| w.message.clone())
            .collect();
        if !config_warnings.is_empty() && !ctx.force {
            let detail = format!(
                "configuration capture was incomplete ({}); use --force to restore anyway",
                config_warnings.join("; ")
            );
            if !ctx.dry_run {
                self.log.error(&format!("refused restore of {id}: {detail}"))?;
            }
            return Err(Error::IntegrityMismatch {
                id: id.to_string(),
                detail,
            });
        }

        let mut report = RestoreReport::new(id, ctx.dry_run, self.log.path().clone());
        if ctx.dry_run {
            report.items = point
                .captured_paths
                .iter()
                .map(ItemReport::succeeded)
                .collect();
            return Ok(report);
        }

        let emergency = self.create_unlocked(
            &format!("before restoring {id}"),
            "automatic point taken before a rollback restore",
            true,
            &[id],
            ctx,
        )?;
        report.emergency_point = Some(emergency.id.clone());

        let engine = RestoreEngine::new(self.runner, &self.settings.permissions);
        let configs = self.point_dir(id).join(CaptureArea::Configs.dir_name());
        for path in &point.captured_paths {
            if let Err(e) = self.policy.validate(path) {
                report.items.push(ItemReport::skipped(path, e));
                continue;
            }
            let live = self.settings.live_path(path);
            match engine.replace_tree(&configs.join(path), &live) {
                Ok(stats) => {
                    info!(%path, files = stats.files, "replaced from rollback point");
                    report.items.push(ItemReport::succeeded(path));
                }
                Err(e) => {
                    warn!(%path, error = %e, "replace failed");
                    report.items.push(ItemReport::failed(path, e));
                }
            }
        }

        report.reload = engine.trigger_reload();
        report.reload.merge(engine.regenerate_boot());

        RollbackIndex::update(&self.index_path(), |index| {
            index.last_restored = Some(id.to_string());
            Ok(())
        })?;

        info!(%id, counts = %report.counts(), "rollback restore finished");
        self.log.info(&format!(
            "restored {id} by {} ({}), emergency point {}, {} reload failure(s)",
            ctx.operator,
            report.counts(),
            emergency.id,
            report.reload.failed.len()
        ))?;
        Ok(report)
    }

    /// Remove a point from the index and disk. Irreversible.
    pub fn delete(
        &self,
        id: &str,
        ctx: &OperatorContext,
        confirm: &dyn Confirm,
    ) -> Result<DeleteReport> {
        self.indexed(id)?;
        require_confirmation(
            ctx,
            confirm,
            "rollback delete",
            &format!("Permanently delete rollback point {id}?"),
        )?;

        let mut report = DeleteReport {
            id: id.to_string(),
            dry_run: ctx.dry_run,
            removed: false,
            log: self.log.path().clone(),
        };
        if ctx.dry_run {
            return Ok(report);
        }

        let _lock = StoreLock::acquire(&self.settings.backup_root)?;
        RollbackIndex::update(&self.index_path(), |index| {
            index.remove(id);
            Ok(())
        })?;
        remove_path(&self.point_dir(id))?;
        report.removed = true;
        info!(%id, "rollback point deleted");
        self.log.info(&format!("deleted {id} by {}", ctx.operator))?;
        Ok(report)
    }

    fn indexed(&self, id: &str) -> Result<RollbackIndexEntry> {
        RollbackIndex::load(&self.index_path())?
            .find(id)
            .cloned()
            .ok_or_else(|| Error::RollbackNotFound { id: id.to_string() })
    }
}

fn new_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("rb-{}-{}", Local::now().format("%Y%m%d-%H%M%S"), &suffix[..8])
}
