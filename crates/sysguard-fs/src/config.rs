//! Settings files and store metadata documents on disk
//!
//! Snapshot metadata is JSON, settings and the rollback index are TOML.
//! The file extension picks the codec.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, NormalizedPath, Result, io};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Toml,
    Json,
}

impl DocumentFormat {
    fn of(path: &NormalizedPath) -> Result<Self> {
        let ext = path.extension().unwrap_or_default();
        if ext.eq_ignore_ascii_case("toml") {
            Ok(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(Error::UnsupportedDocument {
                path: path.to_native(),
                extension: ext.to_string(),
            })
        }
    }

    fn decode<T: DeserializeOwned>(self, text: &str) -> std::result::Result<T, String> {
        match self {
            Self::Toml => toml::from_str(text).map_err(|e| e.message().to_string()),
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        }
    }

    fn encode<T: Serialize>(self, value: &T) -> std::result::Result<String, String> {
        match self {
            Self::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        })
    }
}

/// Reads and writes typed documents; writes go through [`io::write_atomic`]
/// so a crash never leaves a half-written metadata file behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore;

impl ConfigStore {
    pub fn new() -> Self {
        Self
    }

    pub fn load<T: DeserializeOwned>(&self, path: &NormalizedPath) -> Result<T> {
        let format = DocumentFormat::of(path)?;
        let text = io::read_text(path)?;
        format.decode(&text).map_err(|reason| Error::DocumentParse {
            path: path.to_native(),
            format: format.to_string(),
            reason,
        })
    }

    pub fn save<T: Serialize>(&self, path: &NormalizedPath, value: &T) -> Result<()> {
        let format = DocumentFormat::of(path)?;
        let text = format.encode(value).map_err(|reason| Error::DocumentEncode {
            path: path.to_native(),
            format: format.to_string(),
            reason,
        })?;
        io::write_atomic(path, text.as_bytes(), io::RobustnessConfig::default())
    }
}
