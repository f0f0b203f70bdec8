//! Settings and their resolution
//!
//! Configuration is loaded and merged from these sources (later sources override earlier):
//!
//! 1. **Built-in defaults** - the FileMapping table, tracked paths and log set
//! 2. **Global config** - `~/.config/sysguard/config.toml`
//! 3. **Explicit config** - the file passed with `--config`
//!
//! # Example
//!
//! ```ignore
//! use sysguard_core::config::ConfigResolver;
//!
//! let settings = ConfigResolver::new().with_file("/etc/sysguard.toml").resolve()?;
//! println!("Backups in {}", settings.backup_root);
//! ```

mod resolver;
mod settings;

pub use resolver::ConfigResolver;
pub use settings::{FileMapping, PermissionPolicy, Settings};
