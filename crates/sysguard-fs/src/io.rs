//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;
use walkdir::WalkDir;

use crate::{Error, NormalizedPath, Result};

/// Knobs for atomic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobustnessConfig {
    /// fsync the temp file before the rename
    pub enable_fsync: bool,
    /// How long to keep retrying a contended lock before giving up
    pub lock_timeout: Duration,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            enable_fsync: true,
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Acquire an exclusive lock on `file`, retrying with exponential backoff
/// until `timeout` elapses.
pub fn lock_with_retry(file: &File, path: &Path, timeout: Duration) -> Result<()> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(10))
        .with_max_interval(Duration::from_millis(250))
        .with_max_elapsed_time(Some(timeout))
        .build();

    backoff::retry(policy, || FileExt::try_lock_exclusive(file).map_err(backoff::Error::transient))
        .map_err(|_| Error::LockFailed {
            path: path.to_path_buf(),
        })
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers never observe a partial file.
pub fn write_atomic(path: &NormalizedPath, content: &[u8], config: RobustnessConfig) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    // Same directory keeps the rename on one filesystem
    let temp_name = format!(
        ".{}.{}.tmp",
        native_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = native_path.with_file_name(&temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    lock_with_retry(&temp_file, &native_path, config.lock_timeout)?;

    let written = temp_file.write_all(content).and_then(|_| {
        if config.enable_fsync {
            temp_file.sync_all()
        } else {
            Ok(())
        }
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    let _ = FileExt::unlock(&temp_file);

    fs::rename(&temp_path, &native_path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::io(&native_path, e)
    })?;

    Ok(())
}

/// Copy a file atomically: the target is either the old or the new content.
///
/// Permission bits follow the source. Returns the number of bytes copied.
pub fn copy_file_atomic(source: &NormalizedPath, target: &NormalizedPath) -> Result<u64> {
    let content = fs::read(source.to_native()).map_err(|e| Error::io(source.to_native(), e))?;
    write_atomic(target, &content, RobustnessConfig::default())?;
    set_mode(target, mode_of(source)?)?;
    Ok(content.len() as u64)
}

/// Totals for a recursive copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub dirs: usize,
    pub bytes: u64,
}

/// Recursively copy `source` (file or directory) to `target`.
///
/// Symlinks are recreated as symlinks rather than followed.
pub fn copy_tree(source: &NormalizedPath, target: &NormalizedPath) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    let src_root = source.to_native();

    if src_root.is_file() {
        stats.bytes += copy_file_atomic(source, target)?;
        stats.files += 1;
        return Ok(stats);
    }

    for entry in WalkDir::new(&src_root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src_root.clone());
            Error::io(path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(&src_root)
            .map_err(|_| Error::io(entry.path(), std::io::ErrorKind::InvalidInput.into()))?;
        let dest = target.join(&relative.to_string_lossy());
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(dest.to_native()).map_err(|e| Error::io(dest.to_native(), e))?;
            stats.dirs += 1;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
            stats.files += 1;
        } else {
            stats.bytes += copy_file_atomic(&NormalizedPath::new(entry.path()), &dest)?;
            stats.files += 1;
        }
    }

    Ok(stats)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, dest: &NormalizedPath) -> Result<()> {
    let pointee = fs::read_link(link).map_err(|e| Error::io(link, e))?;
    let native = dest.to_native();
    if let Some(parent) = native.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    if native.symlink_metadata().is_ok() {
        fs::remove_file(&native).map_err(|e| Error::io(&native, e))?;
    }
    std::os::unix::fs::symlink(pointee, &native).map_err(|e| Error::io(&native, e))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, dest: &NormalizedPath) -> Result<()> {
    copy_file_atomic(&NormalizedPath::new(link), dest).map(|_| ())
}

/// Remove a file, symlink or directory tree. Missing paths are not an error.
pub fn remove_path(path: &NormalizedPath) -> Result<()> {
    let native = path.to_native();
    let Ok(meta) = native.symlink_metadata() else {
        return Ok(());
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(&native)
    } else {
        fs::remove_file(&native)
    };
    removed.map_err(|e| Error::io(&native, e))
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Write text content to a file atomically.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes(), RobustnessConfig::default())
}

/// Set unix permission bits on a path.
#[cfg(unix)]
pub fn set_mode(path: &NormalizedPath, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let native = path.to_native();
    fs::set_permissions(&native, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::io(&native, e))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &NormalizedPath, _mode: u32) -> Result<()> {
    Ok(())
}

/// Read unix permission bits (lower 12 bits) of a path.
#[cfg(unix)]
pub fn mode_of(path: &NormalizedPath) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let native = path.to_native();
    let meta = fs::metadata(&native).map_err(|e| Error::io(&native, e))?;
    Ok(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub fn mode_of(_path: &NormalizedPath) -> Result<u32> {
    Ok(0o644)
}
