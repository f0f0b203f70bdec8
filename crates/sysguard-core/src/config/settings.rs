//! Effective settings for a sysguard run

use serde::{Deserialize, Serialize};
use sysguard_fs::{NormalizedPath, StorePath};

use crate::{Error, Result};

/// One file this system is allowed to snapshot and restore.
///
/// `target` is the backup copy's path relative to a snapshot's mirror
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapping {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
}

impl FileMapping {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            description: description.into(),
        }
    }

    /// Mapping whose backup copy mirrors the source path (`/etc/a` -> `etc/a`).
    pub fn mirrored(source: &str, description: &str) -> Self {
        Self::new(source, source.trim_start_matches('/'), description)
    }
}

/// Ownership and mode applied uniformly to every restored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionPolicy {
    /// Octal mode string, e.g. `"0644"`
    pub mode: String,
    /// `user:group` handed to `chown`
    pub owner: String,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            mode: "0644".to_string(),
            owner: "root:root".to_string(),
        }
    }
}

impl PermissionPolicy {
    /// Parse the configured mode as permission bits.
    pub fn mode_bits(&self) -> Result<u32> {
        let digits = self.mode.trim().trim_start_matches("0o");
        u32::from_str_radix(digits, 8)
            .ok()
            .filter(|bits| *bits <= 0o7777)
            .ok_or_else(|| Error::InvalidSettings {
                message: format!("permissions.mode '{}' is not an octal mode", self.mode),
            })
    }
}

/// Effective configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory logical machine paths are re-rooted under
    pub system_root: NormalizedPath,
    /// Where snapshots, rollback points and logs live
    pub backup_root: NormalizedPath,
    /// Maximum number of rollback points kept
    pub retention: usize,
    pub permissions: PermissionPolicy,
    pub journal_keyword: String,
    pub network_probe_host: String,
    /// Free space the disk-space recovery requires on `/`
    pub min_free_bytes: u64,
    /// Configuration paths captured by rollback points
    pub tracked_paths: Vec<String>,
    /// Log files captured by rollback points
    pub log_files: Vec<String>,
    pub mappings: Vec<FileMapping>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_root: NormalizedPath::new("/"),
            backup_root: NormalizedPath::new("/var/backups/sysguard"),
            retention: 10,
            permissions: PermissionPolicy::default(),
            journal_keyword: "nvidia|Xorg|tlp|asusd|supergfxd".to_string(),
            network_probe_host: "archlinux.org".to_string(),
            min_free_bytes: 1024 * 1024 * 1024,
            tracked_paths: default_tracked_paths(),
            log_files: vec![
                "/var/log/Xorg.0.log".to_string(),
                "/var/log/pacman.log".to_string(),
                "/var/log/tlp.log".to_string(),
            ],
            mappings: default_mappings(),
        }
    }
}

fn default_tracked_paths() -> Vec<String> {
    [
        "/etc/X11/xorg.conf",
        "/etc/X11/xorg.conf.d",
        "/etc/systemd/system",
        "/etc/udev/rules.d",
        "/etc/modprobe.d",
        "/etc/modules-load.d",
        "/etc/default/grub",
        "/etc/tlp.conf",
        "/etc/tlp.d",
        "/etc/asusd",
        "/etc/supergfxd.conf",
        "/etc/mkinitcpio.conf",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_mappings() -> Vec<FileMapping> {
    vec![
        FileMapping::mirrored("/etc/X11/xorg.conf", "Xorg server configuration"),
        FileMapping::mirrored(
            "/etc/X11/xorg.conf.d/10-nvidia.conf",
            "Xorg GPU device section",
        ),
        FileMapping::mirrored("/etc/tlp.conf", "TLP power management"),
        FileMapping::mirrored("/etc/modprobe.d/nvidia.conf", "NVIDIA module options"),
        FileMapping::mirrored("/etc/modprobe.d/blacklist.conf", "Module blacklist"),
        FileMapping::mirrored("/etc/modules-load.d/modules.conf", "Modules loaded at boot"),
        FileMapping::mirrored(
            "/etc/udev/rules.d/80-nvidia-pm.rules",
            "GPU runtime power management rules",
        ),
        FileMapping::mirrored("/etc/systemd/logind.conf", "Lid and power key handling"),
        FileMapping::mirrored("/etc/asusd/asusd.ron", "asusd daemon configuration"),
        FileMapping::mirrored("/etc/supergfxd.conf", "supergfxd graphics switching"),
        FileMapping::mirrored("/etc/default/grub", "Boot loader defaults"),
        FileMapping::mirrored("/etc/mkinitcpio.conf", "Initial ramdisk configuration"),
    ]
}

impl Settings {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.retention == 0 {
            return Err(Error::InvalidSettings {
                message: "retention must be at least 1".into(),
            });
        }
        self.permissions.mode_bits()?;
        if !self.permissions.owner.contains(':') {
            return Err(Error::InvalidSettings {
                message: format!(
                    "permissions.owner '{}' must be user:group",
                    self.permissions.owner
                ),
            });
        }
        for mapping in &self.mappings {
            if !mapping.source.starts_with('/') {
                return Err(Error::InvalidMapping {
                    source_path: mapping.source.clone(),
                    message: "source must be an absolute path".into(),
                });
            }
            if mapping.target.trim_matches('/').is_empty() {
                return Err(Error::InvalidMapping {
                    source_path: mapping.source.clone(),
                    message: "target must not be empty".into(),
                });
            }
        }
        Ok(())
    }

    /// Where a logical machine path lives under the system root.
    pub fn live_path(&self, logical: &str) -> NormalizedPath {
        NormalizedPath::new(logical).rerooted(&self.system_root)
    }

    pub fn snapshots_dir(&self) -> NormalizedPath {
        self.backup_root.join(StorePath::SnapshotsDir.as_str())
    }

    pub fn rollback_dir(&self) -> NormalizedPath {
        self.backup_root.join(StorePath::RollbackDir.as_str())
    }

    pub fn logs_dir(&self) -> NormalizedPath {
        self.backup_root.join(StorePath::LogsDir.as_str())
    }

    pub fn lock_path(&self) -> NormalizedPath {
        self.backup_root.join(StorePath::StoreLock.as_str())
    }

    pub fn operations_log(&self) -> NormalizedPath {
        self.logs_dir().join(StorePath::OperationsLog.as_str())
    }

    pub fn recovery_log(&self) -> NormalizedPath {
        self.logs_dir().join(StorePath::RecoveryLog.as_str())
    }
}
