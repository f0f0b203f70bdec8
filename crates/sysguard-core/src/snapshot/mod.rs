//! Per-file, checksum-verified snapshots
//!
//! A snapshot copies every [`FileMapping`] source into
//! `<backup_root>/snapshots/<id>/files/`, records a SHA-256 per file in
//! `metadata.json`, and writes `VERSION` and `SUMMARY.txt` next to it.
//! Capture tolerates per-file failures; restore refuses a snapshot that does
//! not validate.
//!
//! [`FileMapping`]: crate::config::FileMapping

mod metadata;
mod migrate;

pub use metadata::{FORMAT_VERSION, FileEntry, SnapshotInfo, SnapshotMetadata};

use std::fs;

use chrono::Local;
use sysguard_fs::io::{copy_file_atomic, remove_path, write_text};
use sysguard_fs::{ConfigStore, NormalizedPath, StorePath, compute_file_checksum, digests_match};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::context::{Confirm, HostFacts, OperatorContext, require_confirmation};
use crate::exec::CommandRunner;
use crate::ledger::{AppendLog, StoreLock};
use crate::policy::PathPolicy;
use crate::report::{CreateReport, DeleteReport, ItemReport, RestoreReport, ValidationReport};
use crate::restore::RestoreEngine;
use crate::{Error, Result};

use metadata::render_summary;

pub struct SnapshotStore<'a> {
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    policy: PathPolicy,
    log: AppendLog,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn CommandRunner) -> Self {
        Self {
            settings,
            runner,
            policy: PathPolicy::new(),
            log: AppendLog::new(settings.operations_log(), "snapshot"),
        }
    }

    pub fn snapshot_dir(&self, id: &str) -> NormalizedPath {
        self.settings.snapshots_dir().join(id)
    }

    /// Capture every mapped file.
    ///
    /// Protected, missing and unreadable sources are reported per item; the
    /// snapshot is still created.
    pub fn create(&self, description: &str, ctx: &OperatorContext) -> Result<CreateReport> {
        let _lock = self.lock_unless_dry(ctx)?;
        let id = self.allocate_id();
        let dir = self.snapshot_dir(&id);
        let mirror = dir.join(StorePath::MirrorDir.as_str());

        let facts = HostFacts::collect(self.runner, ctx);
        let mut metadata = SnapshotMetadata::new(&id, description, &facts);
        let mut items = Vec::new();

        for mapping in &self.settings.mappings {
            if let Err(e) = self.policy.validate(&mapping.source) {
                warn!(source = %mapping.source, "skipping protected mapping");
                if !ctx.dry_run {
                    self.log.warn(&format!("{id}: skipped {}: {e}", mapping.source))?;
                }
                items.push(ItemReport::skipped(&mapping.source, e));
                continue;
            }

            let live = self.settings.live_path(&mapping.source);
            if !live.exists() {
                debug!(source = %mapping.source, "source missing, skipping");
                let e = Error::MissingSource {
                    path: mapping.source.clone(),
                };
                items.push(ItemReport::skipped(&mapping.source, e));
                continue;
            }
            if !live.is_file() {
                items.push(ItemReport::failed(&mapping.source, "not a regular file"));
                continue;
            }

            let backup = match resolve_in(&mirror, &mapping.target) {
                Ok(path) => path,
                Err(message) => {
                    let e = Error::InvalidMapping {
                        source_path: mapping.source.clone(),
                        message,
                    };
                    items.push(ItemReport::failed(&mapping.source, e));
                    continue;
                }
            };

            if ctx.dry_run {
                items.push(ItemReport::succeeded(&mapping.source));
                continue;
            }

            match capture_file(&live, &backup) {
                Ok((checksum, size_bytes)) => {
                    let backup_path = relative_to(&backup, &dir);
                    debug!(source = %mapping.source, %checksum, "captured");
                    metadata.files.push(FileEntry {
                        source_path: mapping.source.clone(),
                        backup_path,
                        checksum,
                        size_bytes,
                        captured_at: chrono::Utc::now(),
                    });
                    items.push(ItemReport::succeeded(&mapping.source));
                }
                Err(e) => {
                    warn!(source = %mapping.source, error = %e, "capture failed");
                    items.push(ItemReport::failed(&mapping.source, e));
                }
            }
        }

        let report = CreateReport {
            id: id.clone(),
            dry_run: ctx.dry_run,
            items,
            log: self.log.path().clone(),
        };

        if ctx.dry_run {
            info!(%id, counts = %report.counts(), "snapshot dry run");
            return Ok(report);
        }

        fs::create_dir_all(dir.to_native())?;
        ConfigStore::new().save(&dir.join(StorePath::Metadata.as_str()), &metadata)?;
        write_text(
            &dir.join(StorePath::VersionMarker.as_str()),
            &format!("{FORMAT_VERSION}\n"),
        )?;
        write_text(
            &dir.join(StorePath::Summary.as_str()),
            &render_summary(&metadata, &report.items),
        )?;

        info!(%id, counts = %report.counts(), "snapshot created");
        self.log.info(&format!(
            "created {id} by {} ({}): {}",
            ctx.operator,
            report.counts(),
            description
        ))?;
        Ok(report)
    }

    /// All snapshots, newest first. Unreadable metadata is listed as corrupt.
    pub fn list(&self) -> Result<Vec<SnapshotInfo>> {
        let root = self.settings.snapshots_dir();
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut infos = Vec::new();
        for entry in fs::read_dir(root.to_native())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load_metadata(&id) {
                Ok(metadata) => infos.push(SnapshotInfo::from_metadata(&metadata)),
                Err(_) => infos.push(SnapshotInfo::corrupt(id)),
            }
        }

        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(infos)
    }

    /// Newest readable snapshot.
    pub fn latest(&self) -> Result<Option<String>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|info| !info.corrupt)
            .map(|info| info.id))
    }

    pub fn load_metadata(&self, id: &str) -> Result<SnapshotMetadata> {
        let dir = self.existing_dir(id)?;
        ConfigStore::new()
            .load(&dir.join(StorePath::Metadata.as_str()))
            .map_err(Into::into)
    }

    /// Check artifacts, format and every checksum. Problems accumulate.
    pub fn validate(&self, id: &str) -> Result<ValidationReport> {
        let dir = self.existing_dir(id)?;
        let mut report = ValidationReport {
            id: id.to_string(),
            format_version: None,
            files_checked: 0,
            errors: Vec::new(),
        };

        for artifact in [StorePath::Metadata, StorePath::VersionMarker, StorePath::Summary] {
            if !dir.join(artifact.as_str()).is_file() {
                report.errors.push(format!("missing {artifact}"));
            }
        }
        if !report.errors.is_empty() {
            return Ok(report);
        }

        let metadata = match self.load_metadata(id) {
            Ok(m) => m,
            Err(e) => {
                report.errors.push(format!("malformed metadata: {e}"));
                return Ok(report);
            }
        };

        let marker = sysguard_fs::io::read_text(&dir.join(StorePath::VersionMarker.as_str()))?;
        let marker = marker.trim();
        report.format_version = Some(metadata.format_version.clone());
        if marker != metadata.format_version {
            report.errors.push(format!(
                "VERSION says {marker} but metadata says {}",
                metadata.format_version
            ));
        }
        if !migrate::is_supported(&metadata.format_version) {
            report.errors.push(format!(
                "unsupported format version {}",
                metadata.format_version
            ));
            return Ok(report);
        }

        for entry in &metadata.files {
            report.files_checked += 1;
            let backup = match resolve_in(&dir, &entry.backup_path) {
                Ok(path) => path,
                Err(message) => {
                    report.errors.push(format!("{}: {message}", entry.source_path));
                    continue;
                }
            };
            match compute_file_checksum(&backup.to_native()) {
                Ok(actual) if digests_match(&entry.checksum, &actual) => {}
                Ok(_) => report
                    .errors
                    .push(format!("{}: checksum mismatch", entry.source_path)),
                Err(e) => report
                    .errors
                    .push(format!("{}: backup copy unreadable: {e}", entry.source_path)),
            }
        }

        if report.is_valid() {
            debug!(%id, files = report.files_checked, "snapshot valid");
        } else {
            warn!(%id, errors = report.errors.len(), "snapshot failed validation");
        }
        Ok(report)
    }

    /// Restore every entry of a snapshot.
    pub fn restore(
        &self,
        id: &str,
        ctx: &OperatorContext,
        confirm: &dyn Confirm,
    ) -> Result<RestoreReport> {
        self.restore_matching(id, None, ctx, confirm)
    }

    /// Restore only entries whose source path lies under `prefix`.
    pub fn restore_paths(
        &self,
        id: &str,
        prefix: &str,
        ctx: &OperatorContext,
        confirm: &dyn Confirm,
    ) -> Result<RestoreReport> {
        self.restore_matching(id, Some(&NormalizedPath::new(prefix)), ctx, confirm)
    }

    fn restore_matching(
        &self,
        id: &str,
        prefix: Option<&NormalizedPath>,
        ctx: &OperatorContext,
        confirm: &dyn Confirm,
    ) -> Result<RestoreReport> {
        let dir = self.existing_dir(id)?;
        require_confirmation(
            ctx,
            confirm,
            "snapshot restore",
            &format!("Restore snapshot {id} over the live configuration?"),
        )?;
        let _lock = self.lock_unless_dry(ctx)?;

        if let Some(found) = self.recorded_version(&dir).filter(|v| !migrate::is_supported(v)) {
            if !ctx.dry_run {
                self.log
                    .error(&format!("refused restore of {id}: unsupported format {found}"))?;
            }
            return Err(Error::UnsupportedFormatVersion {
                found,
                current: FORMAT_VERSION.to_string(),
            });
        }

        let validation = self.validate(id)?;
        if !validation.is_valid() {
            let detail = validation.errors.join("; ");
            if !ctx.dry_run {
                self.log.error(&format!("refused restore of {id}: {detail}"))?;
            }
            return Err(Error::IntegrityMismatch {
                id: id.to_string(),
                detail,
            });
        }

        let mut report = RestoreReport::new(id, ctx.dry_run, self.log.path().clone());
        let metadata = self.current_format(id, &dir, ctx, &mut report)?;
        let engine = RestoreEngine::new(self.runner, &self.settings.permissions);

        for entry in &metadata.files {
            let in_scope = prefix
                .is_none_or(|p| NormalizedPath::new(&entry.source_path).starts_with(p));
            if !in_scope {
                continue;
            }
            if let Err(e) = self.policy.validate(&entry.source_path) {
                warn!(path = %entry.source_path, "refusing to restore protected path");
                report.items.push(ItemReport::skipped(&entry.source_path, e));
                continue;
            }

            let live = self.settings.live_path(&entry.source_path);
            let backup = dir.join(&entry.backup_path);
            if ctx.dry_run {
                report.items.push(ItemReport::succeeded(&entry.source_path));
                continue;
            }

            match engine.copy_with_safety_net(&backup, &live) {
                Ok(outcome) => {
                    report.safety_copies.extend(outcome.safety_copy);
                    let mut item = ItemReport::succeeded(&entry.source_path);
                    if !outcome.warnings.is_empty() {
                        item.detail = Some(outcome.warnings.join("; "));
                    }
                    report.items.push(item);
                }
                Err(e) => {
                    warn!(path = %entry.source_path, error = %e, "restore failed");
                    report.items.push(ItemReport::failed(&entry.source_path, e));
                }
            }
        }

        if !ctx.dry_run && report.counts().succeeded > 0 {
            report.reload = engine.trigger_reload();
        }

        info!(%id, counts = %report.counts(), dry_run = ctx.dry_run, "snapshot restore finished");
        if !ctx.dry_run {
            self.log.info(&format!(
                "restored {id} by {} ({}), {} reload failure(s)",
                ctx.operator,
                report.counts(),
                report.reload.failed.len()
            ))?;
        }
        Ok(report)
    }

    /// `format_version` as written in `metadata.json`, if it can be read.
    fn recorded_version(&self, dir: &NormalizedPath) -> Option<String> {
        let document: serde_json::Value = ConfigStore::new()
            .load(&dir.join(StorePath::Metadata.as_str()))
            .ok()?;
        document
            .get("format_version")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Load metadata, migrating an older format on disk first.
    fn current_format(
        &self,
        id: &str,
        dir: &NormalizedPath,
        ctx: &OperatorContext,
        report: &mut RestoreReport,
    ) -> Result<SnapshotMetadata> {
        let metadata_path = dir.join(StorePath::Metadata.as_str());
        let mut document: serde_json::Value = ConfigStore::new().load(&metadata_path)?;
        let found = document
            .get("format_version")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if found == FORMAT_VERSION {
            return Ok(serde_json::from_value(document)?);
        }

        migrate::migrate(&mut document, &found, dir)?;
        report.migrated_from = Some(found.clone());
        if !ctx.dry_run {
            ConfigStore::new().save(&metadata_path, &document)?;
            write_text(
                &dir.join(StorePath::VersionMarker.as_str()),
                &format!("{FORMAT_VERSION}\n"),
            )?;
            self.log
                .info(&format!("migrated {id} from format {found} to {FORMAT_VERSION}"))?;
        }
        Ok(serde_json::from_value(document)?)
    }

    /// Remove a snapshot directory. Irreversible.
    pub fn delete(
        &self,
        id: &str,
        ctx: &OperatorContext,
        confirm: &dyn Confirm,
    ) -> Result<DeleteReport> {
        let dir = self.existing_dir(id)?;
        require_confirmation(
            ctx,
            confirm,
            "snapshot delete",
            &format!("Permanently delete snapshot {id}?"),
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
        remove_path(&dir)?;
        report.removed = true;
        info!(%id, "snapshot deleted");
        self.log.info(&format!("deleted {id} by {}", ctx.operator))?;
        Ok(report)
    }

    /// Newest snapshot holding an intact copy of `logical_path`.
    pub fn find_entry(&self, logical_path: &str) -> Result<Option<(String, FileEntry)>> {
        for info in self.list()?.into_iter().filter(|i| !i.corrupt) {
            let metadata = self.load_metadata(&info.id)?;
            let Some(entry) = metadata.entry_for(logical_path) else {
                continue;
            };
            let backup = self.snapshot_dir(&info.id).join(&entry.backup_path);
            let intact = compute_file_checksum(&backup.to_native())
                .map(|actual| digests_match(&entry.checksum, &actual))
                .unwrap_or(false);
            if intact {
                return Ok(Some((info.id, entry.clone())));
            }
        }
        Ok(None)
    }

    /// Absolute location of an entry's backup copy.
    pub fn backup_file(&self, id: &str, entry: &FileEntry) -> NormalizedPath {
        self.snapshot_dir(id).join(&entry.backup_path)
    }

    fn existing_dir(&self, id: &str) -> Result<NormalizedPath> {
        let dir = self.snapshot_dir(id);
        if id.is_empty() || id.contains('/') || id.starts_with('.') || !dir.is_dir() {
            return Err(Error::SnapshotNotFound { id: id.to_string() });
        }
        Ok(dir)
    }

    fn lock_unless_dry(&self, ctx: &OperatorContext) -> Result<Option<StoreLock>> {
        if ctx.dry_run {
            Ok(None)
        } else {
            StoreLock::acquire(&self.settings.backup_root).map(Some)
        }
    }

    fn allocate_id(&self) -> String {
        let base = format!("snap-{}", Local::now().format("%Y%m%d-%H%M%S-%3f"));
        let mut id = base.clone();
        let mut n = 1u32;
        while self.snapshot_dir(&id).exists() {
            id = format!("{base}-{n}");
            n += 1;
        }
        id
    }
}

/// Resolve `relative` inside `base`, refusing anything that escapes it.
fn resolve_in(
    base: &NormalizedPath,
    relative: &str,
) -> std::result::Result<NormalizedPath, String> {
    let resolved = base.join(relative);
    if resolved == *base || !resolved.starts_with(base) {
        return Err(format!("{relative} escapes {base}"));
    }
    Ok(resolved)
}

fn relative_to(path: &NormalizedPath, base: &NormalizedPath) -> String {
    path.as_str()
        .strip_prefix(base.as_str())
        .unwrap_or(path.as_str())
        .trim_start_matches('/')
        .to_string()
}

/// Copy a live file into the mirror; checksum and size of the copy.
fn capture_file(live: &NormalizedPath, backup: &NormalizedPath) -> Result<(String, u64)> {
    let size = copy_file_atomic(live, backup)?;
    let checksum = compute_file_checksum(&backup.to_native())?;
    Ok((checksum, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_targets_are_refused() {
        let base = NormalizedPath::new("/backups/snapshots/snap-1/files");
        assert!(resolve_in(&base, "etc/tlp.conf").is_ok());
        assert!(resolve_in(&base, "../../escape").is_err());
        assert!(resolve_in(&base, "").is_err());
    }

    #[test]
    fn relative_paths_are_taken_from_the_snapshot_dir() {
        let dir = NormalizedPath::new("/b/snapshots/snap-1");
        let file = dir.join("files/etc/tlp.conf");
        assert_eq!(relative_to(&file, &dir), "files/etc/tlp.conf");
    }
}
