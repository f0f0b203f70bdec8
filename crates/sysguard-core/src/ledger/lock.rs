//! Single-writer lock over a backup root

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

use fs2::FileExt;
use sysguard_fs::{NormalizedPath, StorePath};
use tracing::debug;

use crate::{Error, Result};

/// Exclusive lock on `<backup_root>/.lock`, held for the lifetime of the value.
///
/// Acquisition never waits: a second concurrent run fails with
/// [`Error::StoreBusy`].
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub fn acquire(backup_root: &NormalizedPath) -> Result<Self> {
        let root = backup_root.to_native();
        fs::create_dir_all(&root)?;
        let path = root.join(StorePath::StoreLock.as_str());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(?path, "store lock acquired");
                Ok(Self { file, path })
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(Error::StoreBusy { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = ?self.path, "store lock released");
    }
}
