//! Keyed format migrations for snapshot metadata

use serde_json::Value;
use sysguard_fs::NormalizedPath;
use sysguard_fs::checksum::bare_digest;
use tracing::info;

use super::metadata::FORMAT_VERSION;
use crate::{Error, Result};

type Migration = fn(&mut Value, &NormalizedPath) -> Result<()>;

/// `(from, to, step)`; a migration chain follows these until the current version.
const MIGRATIONS: &[(&str, &str, Migration)] = &[("1", "2", v1_to_v2)];

/// Whether `version` is current or has a migration path to it.
pub fn is_supported(version: &str) -> bool {
    version == FORMAT_VERSION || MIGRATIONS.iter().any(|(from, _, _)| *from == version)
}

/// Migrate a metadata document in place to the current version.
///
/// `snapshot_dir` lets a step read the captured files. Returns the chain of
/// versions passed through (empty when already current).
pub fn migrate(
    document: &mut Value,
    from: &str,
    snapshot_dir: &NormalizedPath,
) -> Result<Vec<String>> {
    let mut version = from.to_string();
    let mut chain = Vec::new();

    while version != FORMAT_VERSION {
        let Some((_, to, step)) = MIGRATIONS.iter().find(|(f, _, _)| *f == version) else {
            return Err(Error::UnsupportedFormatVersion {
                found: version,
                current: FORMAT_VERSION.to_string(),
            });
        };
        step(document, snapshot_dir)?;
        info!(from = %version, to = %to, "migrated snapshot metadata");
        chain.push(version);
        version = to.to_string();
    }

    Ok(chain)
}

/// Version 1 prefixed checksums with `sha256:` and recorded no sizes.
fn v1_to_v2(document: &mut Value, snapshot_dir: &NormalizedPath) -> Result<()> {
    if let Some(files) = document.get_mut("files").and_then(Value::as_array_mut) {
        for file in files {
            let Some(entry) = file.as_object_mut() else {
                continue;
            };
            if let Some(checksum) = entry.get("checksum").and_then(Value::as_str) {
                let bare = bare_digest(checksum).to_string();
                entry.insert("checksum".into(), Value::String(bare));
            }
            if !entry.contains_key("size_bytes") {
                let size = entry
                    .get("backup_path")
                    .and_then(Value::as_str)
                    .and_then(|rel| std::fs::metadata(snapshot_dir.join(rel).to_native()).ok())
                    .map(|m| m.len())
                    .unwrap_or(0);
                entry.insert("size_bytes".into(), Value::from(size));
            }
        }
    }

    match document.as_object_mut() {
        Some(root) => {
            root.insert("format_version".into(), Value::String("2".into()));
            Ok(())
        }
        None => Err(Error::UnsupportedFormatVersion {
            found: "1 (not an object)".into(),
            current: FORMAT_VERSION.to_string(),
        }),
    }
}
