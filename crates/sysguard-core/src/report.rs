//! Per-operation reports
//!
//! Every operation ends with explicit succeeded/failed/skipped counts and a
//! pointer to the log it wrote.

use std::fmt;

use serde::Serialize;
use sysguard_fs::NormalizedPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Outcome for one file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub path: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ItemReport {
    pub fn succeeded(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ItemStatus::Succeeded,
            detail: None,
        }
    }

    pub fn failed(path: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            status: ItemStatus::Failed,
            detail: Some(detail.to_string()),
        }
    }

    pub fn skipped(path: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            status: ItemStatus::Skipped,
            detail: Some(detail.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Counts {
    pub fn tally(items: &[ItemReport]) -> Self {
        items.iter().fold(Self::default(), |mut counts, item| {
            match item.status {
                ItemStatus::Succeeded => counts.succeeded += 1,
                ItemStatus::Failed => counts.failed += 1,
                ItemStatus::Skipped => counts.skipped += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded={} failed={} skipped={}",
            self.succeeded, self.failed, self.skipped
        )
    }
}

/// Result of creating a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub id: String,
    pub dry_run: bool,
    pub items: Vec<ItemReport>,
    pub log: NormalizedPath,
}

impl CreateReport {
    pub fn counts(&self) -> Counts {
        Counts::tally(&self.items)
    }
}

/// Which best-effort reload commands ran and which failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub attempted: Vec<String>,
    pub failed: Vec<ReloadFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadFailure {
    pub command: String,
    pub message: String,
}

impl ReloadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: ReloadReport) {
        self.attempted.extend(other.attempted);
        self.failed.extend(other.failed);
    }
}

/// Result of restoring a snapshot or a rollback point.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub id: String,
    pub dry_run: bool,
    pub items: Vec<ItemReport>,
    /// Pre-restore copies of live files that were overwritten
    pub safety_copies: Vec<NormalizedPath>,
    pub reload: ReloadReport,
    /// Format version the snapshot was migrated from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<String>,
    /// Emergency rollback point taken before a rollback restore
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_point: Option<String>,
    pub log: NormalizedPath,
}

impl RestoreReport {
    pub fn new(id: impl Into<String>, dry_run: bool, log: NormalizedPath) -> Self {
        Self {
            id: id.into(),
            dry_run,
            items: Vec::new(),
            safety_copies: Vec::new(),
            reload: ReloadReport::default(),
            migrated_from: None,
            emergency_point: None,
            log,
        }
    }

    pub fn counts(&self) -> Counts {
        Counts::tally(&self.items)
    }
}

/// Result of validating a snapshot. Errors accumulate; nothing fails fast.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    pub files_checked: usize,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub id: String,
    pub dry_run: bool,
    pub removed: bool,
    pub log: NormalizedPath,
}
