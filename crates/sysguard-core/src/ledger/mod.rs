//! Durable cross-invocation state
//!
//! Everything that outlives a single run goes through one of three
//! single-writer types: [`StoreLock`] guards a backup root, [`AppendLog`]
//! appends audit lines, and [`RollbackIndex`] is rewritten atomically.

mod index;
mod lock;

pub use index::{RollbackIndex, RollbackIndexEntry};
pub use lock::StoreLock;

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::Duration;

use chrono::{Local, SecondsFormat};
use fs2::FileExt;
use sysguard_fs::NormalizedPath;
use sysguard_fs::io::lock_with_retry;

use crate::Result;

const LOG_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Severity recorded in an audit line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Append-only, line-oriented audit log.
///
/// Each line is `<RFC3339 timestamp> <LEVEL> <component>: <message>`.
/// Lines are appended under an exclusive file lock and never rewritten.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: NormalizedPath,
    component: String,
}

impl AppendLog {
    pub fn new(path: NormalizedPath, component: impl Into<String>) -> Self {
        Self {
            path,
            component: component.into(),
        }
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    /// Same file, different component label.
    pub fn for_component(&self, component: impl Into<String>) -> Self {
        Self::new(self.path.clone(), component)
    }

    pub fn append(&self, level: LogLevel, message: &str) -> Result<()> {
        let native = self.path.to_native();
        if let Some(parent) = native.parent() {
            fs::create_dir_all(parent)?;
        }

        let line = format!(
            "{} {} {}: {}\n",
            Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            level,
            self.component,
            message.replace(['\n', '\r'], " ")
        );

        let mut file = OpenOptions::new().create(true).append(true).open(&native)?;
        lock_with_retry(&file, &native, LOG_LOCK_TIMEOUT)?;
        let written = file.write_all(line.as_bytes());
        let _ = FileExt::unlock(&file);
        written?;
        Ok(())
    }

    pub fn info(&self, message: &str) -> Result<()> {
        self.append(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> Result<()> {
        self.append(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> Result<()> {
        self.append(LogLevel::Error, message)
    }

    /// All lines so far; a log that was never written is empty.
    pub fn lines(&self) -> Result<Vec<String>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let content = sysguard_fs::io::read_text(&self.path)?;
        Ok(content.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lines_follow_audit_format() {
        let dir = tempdir().unwrap();
        let log = AppendLog::new(
            NormalizedPath::new(dir.path().join("logs/operations.log")),
            "snapshot",
        );

        log.info("created snap-1").unwrap();
        log.warn("skipped /home/u/.bashrc\nprotected").unwrap();

        let lines = log.lines().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO snapshot: created snap-1"));
        assert!(lines[1].contains("WARN snapshot: skipped /home/u/.bashrc protected"));

        let timestamp = lines[0].split(' ').next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn appends_never_truncate() {
        let dir = tempdir().unwrap();
        let path = NormalizedPath::new(dir.path().join("recovery.log"));
        AppendLog::new(path.clone(), "recovery").info("first").unwrap();
        AppendLog::new(path.clone(), "recovery").info("second").unwrap();

        let lines = AppendLog::new(path, "recovery").lines().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first"));
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempdir().unwrap();
        let log = AppendLog::new(NormalizedPath::new(dir.path().join("none.log")), "x");
        assert!(log.lines().unwrap().is_empty());
    }
}
