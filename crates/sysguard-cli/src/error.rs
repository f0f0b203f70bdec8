//! Error types for sysguard-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from sysguard-core
    #[error(transparent)]
    Core(#[from] sysguard_core::Error),

    /// Error from sysguard-fs
    #[error(transparent)]
    Fs(#[from] sysguard_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A recovery ran but did not reach its threshold
    #[error("{class} recovery finished {verdict} ({rate}% of steps succeeded, {threshold}% needed)")]
    RecoveryIncomplete {
        class: String,
        verdict: sysguard_core::Verdict,
        rate: u8,
        threshold: u8,
    },

    /// The guarded command did not succeed
    #[error("guarded command failed: {detail}")]
    GuardFailed { detail: String },

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// A partial recovery exits 2 so scripts can tell it from a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RecoveryIncomplete {
                verdict: sysguard_core::Verdict::Partial,
                ..
            } => 2,
            Self::Core(sysguard_core::Error::StoreBusy { .. }) => 3,
            _ => 1,
        }
    }
}
