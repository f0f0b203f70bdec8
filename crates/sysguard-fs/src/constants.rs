//! Names of the fixed artifacts inside a backup root.

use std::path::Path;

/// Standard store paths, relative to the backup root or to a single
/// snapshot / rollback directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePath {
    /// `snapshots/` under the backup root
    SnapshotsDir,
    /// `rollback/` under the backup root
    RollbackDir,
    /// `logs/` under the backup root
    LogsDir,
    /// `.lock` single-writer lock file under the backup root
    StoreLock,
    /// `files/` mirrored tree inside a snapshot
    MirrorDir,
    /// `metadata.json` inside a snapshot or rollback point
    Metadata,
    /// `VERSION` format marker inside a snapshot
    VersionMarker,
    /// `SUMMARY.txt` human-readable summary inside a snapshot
    Summary,
    /// `index.toml` shared rollback index
    RollbackIndex,
    /// `operations.log` general operations log
    OperationsLog,
    /// `recovery.log` recovery step log
    RecoveryLog,
}

impl StorePath {
    /// Get the string representation of the path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SnapshotsDir => "snapshots",
            Self::RollbackDir => "rollback",
            Self::LogsDir => "logs",
            Self::StoreLock => ".lock",
            Self::MirrorDir => "files",
            Self::Metadata => "metadata.json",
            Self::VersionMarker => "VERSION",
            Self::Summary => "SUMMARY.txt",
            Self::RollbackIndex => "index.toml",
            Self::OperationsLog => "operations.log",
            Self::RecoveryLog => "recovery.log",
        }
    }
}

impl AsRef<Path> for StorePath {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for StorePath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
