//! Shared index of rollback points

use std::fs::{self, OpenOptions};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sysguard_fs::io::{RobustnessConfig, lock_with_retry, write_atomic};
use sysguard_fs::NormalizedPath;

use crate::Result;

const INDEX_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Compact record of one rollback point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackIndexEntry {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub emergency: bool,
}

/// The index document, `rollback/index.toml`.
///
/// Listing reads only this file. Mutations go through [`RollbackIndex::update`],
/// which holds `index.toml.lock` across the read-modify-write and replaces the
/// document atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackIndex {
    /// Rollback point most recently restored
    #[serde(default)]
    pub last_restored: Option<String>,
    #[serde(default)]
    pub entries: Vec<RollbackIndexEntry>,
}

impl RollbackIndex {
    /// Load the index; a missing document is an empty index.
    pub fn load(path: &NormalizedPath) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = sysguard_fs::io::read_text(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Read, modify and rewrite the index under its lock.
    pub fn update<T>(
        path: &NormalizedPath,
        mutate: impl FnOnce(&mut RollbackIndex) -> Result<T>,
    ) -> Result<T> {
        let native = path.to_native();
        if let Some(parent) = native.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_path = path.with_suffix(".lock").to_native();
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_with_retry(&lock_file, &lock_path, INDEX_LOCK_TIMEOUT)?;

        let outcome = (|| -> Result<T> {
            let mut index = Self::load(path)?;
            let value = mutate(&mut index)?;
            let content = toml::to_string_pretty(&index)?;
            write_atomic(path, content.as_bytes(), RobustnessConfig::default())?;
            Ok(value)
        })();

        let _ = FileExt::unlock(&lock_file);
        outcome
    }

    pub fn find(&self, id: &str) -> Option<&RollbackIndexEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn push(&mut self, entry: RollbackIndexEntry) {
        self.entries.push(entry);
    }

    pub fn remove(&mut self, id: &str) -> Option<RollbackIndexEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        if self.last_restored.as_deref() == Some(id) {
            self.last_restored = None;
        }
        Some(self.entries.remove(pos))
    }

    /// Entries sorted by creation time, newest first.
    pub fn newest_first(&self) -> Vec<RollbackIndexEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        entries
    }

    /// Drop the oldest entries until at most `cap` remain.
    ///
    /// Ids in `protected` are never evicted, even if that leaves the index
    /// above the cap. Returns the evicted entries, oldest first.
    pub fn evict_beyond(&mut self, cap: usize, protected: &[&str]) -> Vec<RollbackIndexEntry> {
        self.entries
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut evicted = Vec::new();
        while self.entries.len() > cap {
            let Some(pos) = self
                .entries
                .iter()
                .position(|e| !protected.contains(&e.id.as_str()))
            else {
                break;
            };
            let entry = self.entries.remove(pos);
            if self.last_restored.as_deref() == Some(entry.id.as_str()) {
                self.last_restored = None;
            }
            evicted.push(entry);
        }
        evicted
    }
}
