//! Failures raised by the filesystem layer

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid {format}: {reason}")]
    DocumentParse {
        path: PathBuf,
        format: String,
        reason: String,
    },

    #[error("could not encode {path} as {format}: {reason}")]
    DocumentEncode {
        path: PathBuf,
        format: String,
        reason: String,
    },

    /// Only `.toml` and `.json` documents are understood.
    #[error("{path}: no document format for extension '{extension}'")]
    UnsupportedDocument { path: PathBuf, extension: String },

    #[error("store lock at {path} is held by another process")]
    LockFailed { path: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
