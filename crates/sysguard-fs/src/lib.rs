//! Filesystem primitives for sysguard
//!
//! Provides normalized path handling, SHA-256 checksums, and atomic,
//! locked I/O used by the snapshot and rollback stores.

pub mod checksum;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod path;

pub use checksum::{compute_content_checksum, compute_file_checksum, digests_match};
pub use config::ConfigStore;
pub use constants::StorePath;
pub use error::{Error, Result};
pub use io::{CopyStats, RobustnessConfig};
pub use path::NormalizedPath;
