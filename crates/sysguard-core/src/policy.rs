//! Protected-path classification
//!
//! Every copy into or out of a backup is gated here. Paths are the logical
//! machine paths (`/etc/tlp.conf`), never their re-rooted location.

use glob::{MatchOptions, Pattern};
use sysguard_fs::NormalizedPath;
use tracing::warn;

use crate::{Error, Result};

/// Home directories, key stores and credential files.
///
/// `*` also crosses `/`, so `/home/*` covers everything below `/home`.
pub const PROTECTED_PATTERNS: &[&str] = &[
    "/home/*",
    "/root/*",
    "*/.ssh/*",
    "*/.gnupg/*",
    "/etc/passwd*",
    "/etc/shadow*",
    "/etc/group*",
    "/etc/gshadow*",
    "/etc/sudoers",
    "/etc/sudoers.d/*",
    "/etc/ssh/ssh_host_*",
];

/// Roots that hold system configuration.
pub const CONFIG_ROOTS: &[&str] = &[
    "/etc",
    "/usr/lib/systemd",
    "/usr/lib/udev",
    "/usr/lib/modprobe.d",
    "/usr/share/X11",
    "/boot/loader",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// How an accepted path relates to the known configuration roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    ConfigRoot,
    OutsideConfigRoots,
}

/// Fixed protected-pattern set plus recognized configuration roots.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    patterns: Vec<(&'static str, Pattern)>,
    config_roots: Vec<NormalizedPath>,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl PathPolicy {
    pub fn new() -> Self {
        let patterns = PROTECTED_PATTERNS
            .iter()
            .filter_map(|raw| Pattern::new(raw).ok().map(|p| (*raw, p)))
            .collect();
        let config_roots = CONFIG_ROOTS.iter().map(NormalizedPath::new).collect();
        Self {
            patterns,
            config_roots,
        }
    }

    /// The first protected pattern `path` matches, if any.
    pub fn matching_pattern(&self, path: &str) -> Option<&'static str> {
        let normalized = NormalizedPath::new(path);
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.matches_with(normalized.as_str(), MATCH_OPTIONS))
            .map(|(raw, _)| *raw)
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }

    /// Reject protected paths; warn (without failing) outside config roots.
    pub fn validate(&self, path: &str) -> Result<PathClass> {
        if let Some(pattern) = self.matching_pattern(path) {
            return Err(Error::PathRejected {
                path: path.to_string(),
                pattern: pattern.to_string(),
            });
        }

        let normalized = NormalizedPath::new(path);
        if self.config_roots.iter().any(|root| normalized.starts_with(root)) {
            Ok(PathClass::ConfigRoot)
        } else {
            warn!(path = %normalized, "path is outside recognized configuration roots");
            Ok(PathClass::OutsideConfigRoots)
        }
    }
}
