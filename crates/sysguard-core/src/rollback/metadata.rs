//! Rollback point metadata (`metadata.json`)

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Settings;
use crate::context::HostFacts;
use crate::exec::{CommandRunner, CommandSpec};

/// The four capture areas of a rollback point, one directory each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureArea {
    Configs,
    Packages,
    Services,
    Logs,
}

impl CaptureArea {
    pub const ALL: [CaptureArea; 4] = [
        CaptureArea::Configs,
        CaptureArea::Packages,
        CaptureArea::Services,
        CaptureArea::Logs,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Configs => "configs",
            Self::Packages => "packages",
            Self::Services => "services",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for CaptureArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A capture step that failed without aborting the capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureWarning {
    pub area: CaptureArea,
    pub message: String,
}

/// Which areas were captured completely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentsFlags {
    pub configs: bool,
    pub packages: bool,
    pub services: bool,
    pub logs: bool,
}

impl ContentsFlags {
    /// An area is complete iff none of `warnings` belongs to it.
    pub fn from_warnings(warnings: &[CaptureWarning]) -> Self {
        let clean = |area: CaptureArea| !warnings.iter().any(|w| w.area == area);
        Self {
            configs: clean(CaptureArea::Configs),
            packages: clean(CaptureArea::Packages),
            services: clean(CaptureArea::Services),
            logs: clean(CaptureArea::Logs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub vendor: String,
    pub product: String,
    #[serde(default)]
    pub gpus: Vec<String>,
}

impl HardwareInfo {
    /// DMI strings from sysfs plus display controllers from `lspci`.
    pub fn collect(settings: &Settings, runner: &dyn CommandRunner) -> Self {
        let read_dmi = |name: &str| {
            let path = settings.live_path(&format!("/sys/class/dmi/id/{name}"));
            std::fs::read_to_string(path.to_native())
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        };

        let gpus = match runner.run(&CommandSpec::new("lspci")) {
            Ok(output) => parse_display_controllers(&output.stdout),
            Err(e) => {
                debug!(error = %e, "lspci unavailable");
                Vec::new()
            }
        };

        Self {
            vendor: read_dmi("sys_vendor"),
            product: read_dmi("product_name"),
            gpus,
        }
    }
}

/// Device names of VGA, 3D and display controllers in `lspci` output.
pub fn parse_display_controllers(lspci: &str) -> Vec<String> {
    let Ok(pattern) =
        Regex::new(r"(?m)^\S+\s+(?:VGA compatible controller|3D controller|Display controller):\s*(.+)$")
    else {
        return Vec::new();
    };
    pattern
        .captures_iter(lspci)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// Everything recorded about one rollback point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPoint {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Taken automatically before another point was restored
    #[serde(default)]
    pub emergency: bool,
    pub system_info: HostFacts,
    pub hardware_info: HardwareInfo,
    pub contents: ContentsFlags,
    /// Tracked configuration paths that existed and were captured
    #[serde(default)]
    pub captured_paths: Vec<String>,
    #[serde(default)]
    pub package_count: usize,
    #[serde(default)]
    pub capture_warnings: Vec<CaptureWarning>,
}

impl RollbackPoint {
    pub fn warnings_for(&self, area: CaptureArea) -> impl Iterator<Item = &CaptureWarning> {
        self.capture_warnings.iter().filter(move |w| w.area == area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_controllers_are_extracted() {
        let lspci = "\
00:00.0 Host bridge: Advanced Micro Devices, Inc. [AMD] Root Complex
01:00.0 VGA compatible controller: NVIDIA Corporation AD106M [GeForce RTX 4070 Max-Q / Mobile] (rev a1)
01:00.1 Audio device: NVIDIA Corporation Device 22bd (rev a1)
65:00.0 Display controller: Advanced Micro Devices, Inc. [AMD/ATI] Phoenix1 (rev c7)
";
        let gpus = parse_display_controllers(lspci);
        assert_eq!(gpus.len(), 2);
        assert!(gpus[0].starts_with("NVIDIA Corporation AD106M"));
        assert!(gpus[1].contains("Phoenix1"));
    }

    #[test]
    fn flags_follow_warnings() {
        let warnings = vec![CaptureWarning {
            area: CaptureArea::Packages,
            message: "pacman -Qm failed".into(),
        }];
        let flags = ContentsFlags::from_warnings(&warnings);
        assert_eq!(
            flags,
            ContentsFlags {
                configs: true,
                packages: false,
                services: true,
                logs: true
            }
        );
    }
}
