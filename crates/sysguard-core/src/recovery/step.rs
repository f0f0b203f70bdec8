//! Recovery steps and their execution
//!
//! A step never aborts the run: whatever happens is folded into a
//! `(succeeded, detail)` pair.

use std::fmt;

use chrono::Local;
use sysguard_fs::io::{mode_of, remove_path, set_mode};
use sysguard_fs::{NormalizedPath, compute_file_checksum, digests_match};

use crate::config::Settings;
use crate::context::{AssumeYes, OperatorContext};
use crate::exec::{CommandRunner, CommandSpec};
use crate::policy::PathPolicy;
use crate::restore::{RestoreEngine, free_variant};
use crate::snapshot::{FileEntry, SnapshotStore};

/// What a step does. Paths are logical machine paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Succeeds iff the command exits zero
    Run(CommandSpec),
    /// Succeeds iff some output line's first field equals `entry`
    RunListing { command: CommandSpec, entry: String },
    /// Delete a file; an absent file is already fine
    RemoveFile(String),
    /// Rename a file to `<path>.broken-<timestamp>`; absent is fine
    MoveAside(String),
    /// `MoveAside`, but only once an intact snapshot copy is known to exist
    MoveAsideForRestore(String),
    /// Restore entries under `prefix` from the newest snapshot
    RestoreFromSnapshot { prefix: String },
    /// Restore one file from the newest snapshot holding an intact copy
    RestoreFileFromSnapshot(String),
    /// `chown` every existing mapping source
    ApplyOwnership,
    /// Set the policy mode on every existing mapping source
    ApplyMode,
    /// Every existing mapping source has the policy mode
    VerifyModes,
    /// Absent, or `Section`/`EndSection` lines balance
    VerifyXorgSections(String),
    /// `df` reports at least `min_bytes` available on `mount`
    VerifyFreeSpace { mount: String, min_bytes: u64 },
    /// Live file matches the newest snapshot entry for it
    VerifySnapshotChecksum(String),
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(command) => write!(f, "run `{command}`"),
            Self::RunListing { command, entry } => write!(f, "run `{command}`, expect {entry}"),
            Self::RemoveFile(path) => write!(f, "remove {path}"),
            Self::MoveAside(path) => write!(f, "move {path} aside"),
            Self::MoveAsideForRestore(path) => {
                write!(f, "move {path} aside if a snapshot copy exists")
            }
            Self::RestoreFromSnapshot { prefix } => {
                write!(f, "restore {prefix} from the newest snapshot")
            }
            Self::RestoreFileFromSnapshot(path) => {
                write!(f, "restore {path} from the newest intact snapshot")
            }
            Self::ApplyOwnership => write!(f, "apply ownership policy to mapped files"),
            Self::ApplyMode => write!(f, "apply mode policy to mapped files"),
            Self::VerifyModes => write!(f, "verify modes of mapped files"),
            Self::VerifyXorgSections(path) => write!(f, "verify section balance of {path}"),
            Self::VerifyFreeSpace { mount, min_bytes } => {
                write!(f, "verify at least {min_bytes} bytes free on {mount}")
            }
            Self::VerifySnapshotChecksum(path) => {
                write!(f, "verify {path} matches its snapshot checksum")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
    /// Checks the repair rather than performing it
    pub verification: bool,
}

impl Step {
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            verification: false,
        }
    }

    pub fn verify(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            verification: true,
        }
    }
}

type StepResult = std::result::Result<Option<String>, String>;

/// Performs step actions against the (re-rooted) system.
pub(crate) struct StepExecutor<'a> {
    pub settings: &'a Settings,
    pub runner: &'a dyn CommandRunner,
    pub ctx: &'a OperatorContext,
    pub policy: PathPolicy,
}

impl StepExecutor<'_> {
    /// `Ok(detail)` on success, `Err(detail)` on failure.
    pub fn perform(&self, action: &StepAction) -> StepResult {
        match action {
            StepAction::Run(command) => self
                .runner
                .run(command)
                .map(|_| None)
                .map_err(|e| e.to_string()),
            StepAction::RunListing { command, entry } => {
                let output = self.runner.run(command).map_err(|e| e.to_string())?;
                let listed = output
                    .stdout
                    .lines()
                    .any(|line| line.split_whitespace().next() == Some(entry.as_str()));
                if listed {
                    Ok(None)
                } else {
                    Err(format!("{entry} not listed by `{command}`"))
                }
            }
            StepAction::RemoveFile(path) => {
                self.permitted(path)?;
                let live = self.settings.live_path(path);
                if !live.exists() {
                    return Ok(Some(format!("{path} already absent")));
                }
                remove_path(&live).map(|_| None).map_err(|e| e.to_string())
            }
            StepAction::MoveAside(path) => self.move_aside(path),
            StepAction::MoveAsideForRestore(path) => {
                let (id, _) = self.intact_copy(path)?;
                self.move_aside(path)
                    .map(|detail| detail.map(|d| format!("{d}, copy held by {id}")))
            }
            StepAction::RestoreFromSnapshot { prefix } => self.restore_prefix(prefix),
            StepAction::RestoreFileFromSnapshot(path) => self.restore_file(path),
            StepAction::ApplyOwnership => self.apply_ownership(),
            StepAction::ApplyMode => self.apply_mode(),
            StepAction::VerifyModes => self.verify_modes(),
            StepAction::VerifyXorgSections(path) => self.verify_xorg(path),
            StepAction::VerifyFreeSpace { mount, min_bytes } => {
                self.verify_free_space(mount, *min_bytes)
            }
            StepAction::VerifySnapshotChecksum(path) => self.verify_checksum(path),
        }
    }

    /// Protected paths are never touched by recovery.
    fn permitted(&self, path: &str) -> std::result::Result<(), String> {
        match self.policy.matching_pattern(path) {
            Some(pattern) => Err(format!("{path} is protected ({pattern}), left untouched")),
            None => Ok(()),
        }
    }

    fn intact_copy(&self, path: &str) -> std::result::Result<(String, FileEntry), String> {
        SnapshotStore::new(self.settings, self.runner)
            .find_entry(path)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no intact snapshot copy of {path}, left in place"))
    }

    fn move_aside(&self, path: &str) -> StepResult {
        self.permitted(path)?;
        let live = self.settings.live_path(path);
        if !live.exists() {
            return Ok(Some(format!("{path} absent, nothing to move")));
        }
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let aside = free_variant(live.with_suffix(&format!(".broken-{stamp}")));
        std::fs::rename(live.to_native(), aside.to_native())
            .map(|_| Some(format!("moved to {aside}")))
            .map_err(|e| format!("{path}: {e}"))
    }

    fn restore_prefix(&self, prefix: &str) -> StepResult {
        let store = SnapshotStore::new(self.settings, self.runner);
        let id = store
            .latest()
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no snapshot available".to_string())?;
        let ctx = self.ctx.clone().with_force(true);
        let report = store
            .restore_paths(&id, prefix, &ctx, &AssumeYes)
            .map_err(|e| e.to_string())?;
        let counts = report.counts();
        if counts.succeeded > 0 && counts.failed == 0 {
            Ok(Some(format!("{id}: {counts}")))
        } else {
            Err(format!("{id}: {counts}"))
        }
    }

    fn restore_file(&self, path: &str) -> StepResult {
        self.permitted(path)?;
        let store = SnapshotStore::new(self.settings, self.runner);
        let (id, entry) = self.intact_copy(path)?;
        let engine = RestoreEngine::new(self.runner, &self.settings.permissions);
        let outcome = engine
            .copy_with_safety_net(&store.backup_file(&id, &entry), &self.settings.live_path(path))
            .map_err(|e| e.to_string())?;
        Ok(Some(format!("restored from {id}, {} bytes", outcome.bytes)))
    }

    /// Live locations of existing mapping sources, and the protected
    /// sources left out.
    fn existing_sources(&self) -> (Vec<NormalizedPath>, Vec<String>) {
        let mut accepted = Vec::new();
        let mut skipped = Vec::new();
        for mapping in &self.settings.mappings {
            if self.permitted(&mapping.source).is_err() {
                skipped.push(mapping.source.clone());
                continue;
            }
            let live = self.settings.live_path(&mapping.source);
            if live.is_file() {
                accepted.push(live);
            }
        }
        (accepted, skipped)
    }

    fn apply_ownership(&self) -> StepResult {
        let engine = RestoreEngine::new(self.runner, &self.settings.permissions);
        let (sources, skipped) = self.existing_sources();
        let failures: Vec<String> = sources.iter().filter_map(|p| engine.apply_owner(p)).collect();
        if failures.is_empty() {
            Ok(skipped_detail(&skipped))
        } else {
            Err(failures.join("; "))
        }
    }

    fn apply_mode(&self) -> StepResult {
        let mode = self
            .settings
            .permissions
            .mode_bits()
            .map_err(|e| e.to_string())?;
        let (sources, skipped) = self.existing_sources();
        let failures: Vec<String> = sources
            .iter()
            .filter_map(|p| set_mode(p, mode).err().map(|e| e.to_string()))
            .collect();
        if failures.is_empty() {
            Ok(skipped_detail(&skipped))
        } else {
            Err(failures.join("; "))
        }
    }

    fn verify_modes(&self) -> StepResult {
        let mode = self
            .settings
            .permissions
            .mode_bits()
            .map_err(|e| e.to_string())?;
        let (sources, skipped) = self.existing_sources();
        let wrong: Vec<String> = sources
            .iter()
            .filter(|p| mode_of(p).map(|m| m != mode).unwrap_or(true))
            .map(|p| p.to_string())
            .collect();
        if wrong.is_empty() {
            Ok(skipped_detail(&skipped))
        } else {
            Err(format!("wrong mode on {}", wrong.join(", ")))
        }
    }

    fn verify_xorg(&self, path: &str) -> StepResult {
        let live = self.settings.live_path(path);
        if !live.exists() {
            return Ok(Some(format!("{path} absent, server autodetects")));
        }
        let content = sysguard_fs::io::read_text(&live).map_err(|e| e.to_string())?;
        xorg_sections_balanced(&content).map(|sections| Some(format!("{sections} section(s)")))
    }

    fn verify_free_space(&self, mount: &str, min_bytes: u64) -> StepResult {
        let target = self.settings.live_path(mount);
        let df = CommandSpec::new("df")
            .args(["--output=avail", "-B1"])
            .arg(target.as_str());
        let output = self.runner.run(&df).map_err(|e| e.to_string())?;
        let available = output
            .stdout
            .lines()
            .filter_map(|line| line.trim().parse::<u64>().ok())
            .last()
            .ok_or_else(|| format!("unparseable df output: {}", output.stdout.trim()))?;
        if available >= min_bytes {
            Ok(Some(format!("{available} bytes available")))
        } else {
            Err(format!("only {available} bytes available, need {min_bytes}"))
        }
    }

    fn verify_checksum(&self, path: &str) -> StepResult {
        let (id, entry) = self.intact_copy(path)?;
        let actual = compute_file_checksum(&self.settings.live_path(path).to_native())
            .map_err(|e| format!("{path}: {e}"))?;
        if digests_match(&entry.checksum, &actual) {
            Ok(Some(format!("matches {id}")))
        } else {
            Err(format!("{path} differs from {id}"))
        }
    }
}

fn skipped_detail(skipped: &[String]) -> Option<String> {
    if skipped.is_empty() {
        None
    } else {
        Some(format!("skipped protected {}", skipped.join(", ")))
    }
}

/// Count of balanced sections, or a description of the imbalance.
pub fn xorg_sections_balanced(content: &str) -> std::result::Result<usize, String> {
    let mut depth = 0usize;
    let mut sections = 0usize;
    for (number, line) in content.lines().enumerate() {
        let keyword = line
            .split('#')
            .next()
            .unwrap_or_default()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match keyword.as_str() {
            "section" | "subsection" => depth += 1,
            "endsection" | "endsubsection" => {
                if depth == 0 {
                    return Err(format!("line {}: {keyword} without opening", number + 1));
                }
                depth -= 1;
                if keyword == "endsection" {
                    sections += 1;
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(sections)
    } else {
        Err(format!("{depth} unclosed section(s)"))
    }
}
