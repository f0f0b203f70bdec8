//! Snapshot metadata document (`metadata.json`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysguard_fs::NormalizedPath;

use crate::context::HostFacts;
use crate::report::{Counts, ItemReport, ItemStatus};

/// Format written by this build.
pub const FORMAT_VERSION: &str = "2";

/// One captured file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Logical machine path the file was captured from
    pub source_path: String,
    /// Location of the copy, relative to the snapshot directory
    pub backup_path: String,
    /// Hex SHA-256 of the copy
    pub checksum: String,
    #[serde(default)]
    pub size_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub format_version: String,
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    pub host: String,
    pub kernel_version: String,
    pub operator_user: String,
    pub tool_version: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl SnapshotMetadata {
    pub fn new(id: impl Into<String>, description: impl Into<String>, facts: &HostFacts) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            id: id.into(),
            created_at: Utc::now(),
            description: description.into(),
            host: facts.host.clone(),
            kernel_version: facts.kernel_version.clone(),
            operator_user: facts.operator_user.clone(),
            tool_version: facts.tool_version.clone(),
            files: Vec::new(),
        }
    }

    /// The entry captured from `source_path`, compared after normalization.
    pub fn entry_for(&self, source_path: &str) -> Option<&FileEntry> {
        let wanted = NormalizedPath::new(source_path);
        self.files
            .iter()
            .find(|f| NormalizedPath::new(&f.source_path) == wanted)
    }
}

/// Human-readable `SUMMARY.txt`.
pub fn render_summary(metadata: &SnapshotMetadata, items: &[ItemReport]) -> String {
    let counts = Counts::tally(items);
    let mut out = format!(
        "Snapshot:    {}\nCreated:     {}\nDescription: {}\nHost:        {} ({})\nOperator:    {}\n\nSucceeded: {}\nFailed:    {}\nSkipped:   {}\n\n",
        metadata.id,
        metadata.created_at.to_rfc3339(),
        metadata.description,
        metadata.host,
        metadata.kernel_version,
        metadata.operator_user,
        counts.succeeded,
        counts.failed,
        counts.skipped,
    );
    for item in items {
        let tag = match item.status {
            ItemStatus::Succeeded => "OK  ",
            ItemStatus::Failed => "FAIL",
            ItemStatus::Skipped => "SKIP",
        };
        match &item.detail {
            Some(detail) => out.push_str(&format!("{tag} {} ({detail})\n", item.path)),
            None => out.push_str(&format!("{tag} {}\n", item.path)),
        }
    }
    out
}

/// One row of `snapshot list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub description: String,
    pub files: usize,
    pub format_version: Option<String>,
    /// Metadata could not be read
    pub corrupt: bool,
}

impl SnapshotInfo {
    pub fn from_metadata(metadata: &SnapshotMetadata) -> Self {
        Self {
            id: metadata.id.clone(),
            created_at: Some(metadata.created_at),
            description: metadata.description.clone(),
            files: metadata.files.len(),
            format_version: Some(metadata.format_version.clone()),
            corrupt: false,
        }
    }

    pub fn corrupt(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            description: String::new(),
            files: 0,
            format_version: None,
            corrupt: true,
        }
    }
}
