//! Error types for sysguard-core

use std::path::PathBuf;

use crate::exec::ExternalError;

/// Result type for sysguard-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sysguard-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path matched the protected set; aborts only the single file operation
    #[error("Path rejected: {path} matches protected pattern {pattern}")]
    PathRejected { path: String, pattern: String },

    /// A mapping source does not exist on the live system
    #[error("Source missing: {path}")]
    MissingSource { path: String },

    /// Checksum or structural integrity failure
    #[error("Integrity check failed for {id}: {detail}")]
    IntegrityMismatch { id: String, detail: String },

    /// Snapshot id unknown to the store
    #[error("Snapshot not found: {id}")]
    SnapshotNotFound { id: String },

    /// Rollback id unknown to the index
    #[error("Rollback point not found: {id}")]
    RollbackNotFound { id: String },

    /// Recorded format version has no migration path
    #[error("Unsupported snapshot format version {found} (current is {current})")]
    UnsupportedFormatVersion { found: String, current: String },

    /// Recovery tag not present in the registry
    #[error("Unknown failure class: {tag}")]
    UnknownFailureClass { tag: String },

    /// A recovery procedure needs an argument that was not supplied
    #[error("Recovery procedure {class} requires --{argument}")]
    MissingRecoveryArgument {
        class: String,
        argument: &'static str,
    },

    /// A FileMapping entry is unusable (e.g. its target escapes the snapshot)
    #[error("Invalid file mapping {source_path}: {message}")]
    InvalidMapping { source_path: String, message: String },

    /// Settings could not be interpreted
    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    /// Configuration file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Another process holds the store lock
    #[error("Backup store is busy (locked by another run): {path}")]
    StoreBusy { path: PathBuf },

    /// Operator declined a destructive operation
    #[error("{operation} cancelled by operator")]
    Cancelled { operation: String },

    /// An interrupt arrived; the current step finished, no further step ran
    #[error("Interrupted before {next}")]
    Interrupted { next: String },

    /// An external collaborator failed where the failure is fatal
    #[error(transparent)]
    External(#[from] ExternalError),

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from sysguard-fs
    #[error(transparent)]
    Fs(#[from] sysguard_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}
