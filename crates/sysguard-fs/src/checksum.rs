//! SHA-256 checksum utilities
//!
//! Checksums are bare lowercase hex digests. The legacy `sha256:<hex>` form
//! written by format-1 snapshots is still understood by [`digests_match`].

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Prefix used by legacy (format 1) checksums
pub const LEGACY_PREFIX: &str = "sha256:";

/// Compute the SHA-256 hex digest of in-memory content.
pub fn compute_content_checksum(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 hex digest of a file's contents.
///
/// The file is streamed, so large captures are never read into memory whole.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_file_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Strip the legacy prefix, if any.
pub fn bare_digest(recorded: &str) -> &str {
    recorded.strip_prefix(LEGACY_PREFIX).unwrap_or(recorded)
}

/// Byte-exact comparison of a recorded digest against a fresh one.
pub fn digests_match(recorded: &str, actual: &str) -> bool {
    bare_digest(recorded) == bare_digest(actual)
}
