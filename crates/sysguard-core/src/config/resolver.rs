//! Layered settings resolution
//!
//! The `ConfigResolver` starts from built-in defaults and overlays each
//! configuration file found, later sources replacing earlier values key by key.

use std::path::PathBuf;

use sysguard_fs::{ConfigStore, NormalizedPath};
use tracing::debug;

use super::Settings;
use crate::{Error, Result};

/// Resolves [`Settings`] from a hierarchy of sources:
/// 1. Built-in defaults
/// 2. Global config (`<config_dir>/sysguard/config.toml`)
/// 3. An explicit config file (`--config`)
///
/// A missing global file is skipped; a missing explicit file is an error.
/// Invalid TOML in any layer is an error.
pub struct ConfigResolver {
    explicit: Option<PathBuf>,

    /// Override for the global config directory (used for testing).
    /// When `None`, the platform-appropriate directory is used via `dirs::config_dir()`.
    global_config_dir_override: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self {
            explicit: None,
            global_config_dir_override: None,
        }
    }

    /// Layer an explicit configuration file on top of the global one.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    /// Use a custom global config directory instead of the user's.
    pub fn with_global_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global_config_dir_override = Some(dir.into());
        self
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref override_dir) = self.global_config_dir_override {
            return Some(override_dir.clone());
        }
        dirs::config_dir().map(|d| d.join("sysguard"))
    }

    /// Merge all layers and validate the result.
    pub fn resolve(&self) -> Result<Settings> {
        let store = ConfigStore::new();
        let mut merged = toml::Table::try_from(Settings::default())?;

        // Layer 2 - global config
        if let Some(global_dir) = self.global_config_dir() {
            let global_path = global_dir.join("config.toml");
            if global_path.is_file() {
                debug!(?global_path, "Loading global config (layer 2)");
                let layer: toml::Table = store.load(&NormalizedPath::new(&global_path))?;
                overlay(&mut merged, layer);
            } else {
                debug!(?global_path, "No global config found (layer 2), skipping");
            }
        }

        // Layer 3 - explicit file
        if let Some(ref path) = self.explicit {
            if !path.is_file() {
                return Err(Error::ConfigNotFound { path: path.clone() });
            }
            debug!(?path, "Loading explicit config (layer 3)");
            let layer: toml::Table = store.load(&NormalizedPath::new(path))?;
            overlay(&mut merged, layer);
        }

        let settings: Settings = merged.try_into()?;
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level keys in `layer` replace those in `base`.
fn overlay(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        base.insert(key, value);
    }
}
