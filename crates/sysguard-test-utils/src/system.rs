//! [`TestSystem`] builder for sysguard test scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use sysguard_core::config::{FileMapping, Settings};
use sysguard_fs::NormalizedPath;
use tempfile::TempDir;

/// A temporary machine: a system root standing in for `/` and a backup root
/// standing in for `/var/backups/sysguard`.
///
/// # Example
///
/// ```rust,no_run
/// use sysguard_test_utils::TestSystem;
///
/// let system = TestSystem::new().with_mappings(&["/etc/example.conf"]);
/// system.write_live("/etc/example.conf", "A=1");
/// system.assert_live_contains("/etc/example.conf", "A=1");
/// ```
pub struct TestSystem {
    temp_dir: TempDir,
    settings: Settings,
}

impl Default for TestSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSystem {
    /// Empty system root, empty backup root, default settings otherwise.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            system_root: NormalizedPath::new(temp_dir.path().join("sys")),
            backup_root: NormalizedPath::new(temp_dir.path().join("backups")),
            ..Settings::default()
        };
        fs::create_dir_all(temp_dir.path().join("sys")).unwrap();
        Self { temp_dir, settings }
    }

    /// Replace the mapping table with mirrored mappings of `sources`.
    pub fn with_mappings(mut self, sources: &[&str]) -> Self {
        self.settings.mappings = sources
            .iter()
            .map(|s| FileMapping::mirrored(s, "test mapping"))
            .collect();
        self
    }

    /// Replace the tracked rollback paths.
    pub fn with_tracked(mut self, paths: &[&str]) -> Self {
        self.settings.tracked_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.settings.retention = retention;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Root of the temporary directory holding both roots.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn backup_root(&self) -> PathBuf {
        self.settings.backup_root.to_native()
    }

    /// Where `logical` (e.g. `/etc/tlp.conf`) lives on disk.
    pub fn live(&self, logical: &str) -> PathBuf {
        self.settings.live_path(logical).to_native()
    }

    /// Write a live file, creating parent directories.
    pub fn write_live(&self, logical: &str, content: &str) {
        let path = self.live(logical);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("Could not write {}: {e}", path.display()));
    }

    pub fn read_live(&self, logical: &str) -> String {
        let path = self.live(logical);
        fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", path.display()))
    }

    /// Files next to `logical` whose name starts with its name plus `marker`,
    /// e.g. the `.pre-restore-` safety copies.
    pub fn siblings_with(&self, logical: &str, marker: &str) -> Vec<PathBuf> {
        let path = self.live(logical);
        let Some(name) = path.file_name().map(|n| format!("{}{marker}", n.to_string_lossy())) else {
            return Vec::new();
        };
        let Some(parent) = path.parent() else {
            return Vec::new();
        };
        let mut found: Vec<PathBuf> = fs::read_dir(parent)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .is_some_and(|n| n.to_string_lossy().starts_with(&name))
                    })
                    .collect()
            })
            .unwrap_or_default();
        found.sort();
        found
    }

    /// Write `content` as a config file outside both roots; returns its path.
    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.root().join("sysguard.toml");
        fs::write(&path, content).unwrap();
        path
    }

    /// A config file pointing the CLI at this system's roots and mappings.
    pub fn write_settings_file(&self) -> PathBuf {
        let mut content = format!(
            "system_root = \"{}\"\nbackup_root = \"{}\"\nretention = {}\ntracked_paths = [{}]\n",
            self.settings.system_root,
            self.settings.backup_root,
            self.settings.retention,
            self.settings
                .tracked_paths
                .iter()
                .map(|p| format!("\"{p}\""))
                .collect::<Vec<_>>()
                .join(", ")
        );
        for mapping in &self.settings.mappings {
            content.push_str(&format!(
                "\n[[mappings]]\nsource = \"{}\"\ntarget = \"{}\"\ndescription = \"{}\"\n",
                mapping.source, mapping.target, mapping.description
            ));
        }
        self.write_config(&content)
    }

    /// Assert that the live file at `logical` contains `content`.
    ///
    /// # Panics
    /// Panics if the file cannot be read or does not contain `content`.
    pub fn assert_live_contains(&self, logical: &str, content: &str) {
        let file_content = self.read_live(logical);
        assert!(
            file_content.contains(content),
            "File {} does not contain expected content.\nExpected: {}\nActual: {}",
            logical,
            content,
            file_content
        );
    }
}
