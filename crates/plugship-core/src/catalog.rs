//! Plugin catalog: enumerates the plugin directories under a root.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{PlugshipError, PlugshipResult};

/// A plugin directory and the mtime of the directory itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    /// Seconds since the Unix epoch, fractional.
    pub modify_timestamp: f64,
}

/// Returns true if `name` can only refer to a directory directly under a root.
///
/// `:` is rejected so drive-relative names like `C:foo` cannot replace the
/// root when joined on Windows.
pub fn is_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', ':', '\0'])
}

/// Locate the directory for `name` under `root`, if it is a valid name and exists.
pub fn plugin_dir(root: &Path, name: &str) -> Option<PathBuf> {
    if !is_plugin_name(name) {
        return None;
    }
    let dir = root.join(name);
    dir.is_dir().then_some(dir)
}

/// Modification time of `path` as fractional epoch seconds.
pub fn modified_timestamp(path: &Path) -> PlugshipResult<f64> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| PlugshipError::io(path, e))?;
    Ok(epoch_seconds(modified))
}

fn epoch_seconds(t: SystemTime) -> f64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// List every immediate subdirectory of `root`, sorted by name.
///
/// An unreadable root is an error; files in the root are ignored.
pub fn list_plugins(root: &Path) -> PlugshipResult<Vec<PluginDescriptor>> {
    let entries = std::fs::read_dir(root).map_err(|e| PlugshipError::io(root, e))?;

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PlugshipError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = match path.file_name().and_then(|s| s.to_str()) {
            Some(n) => n.to_string(),
            None => {
                tracing::debug!("skipping non-utf8 plugin dir: {}", path.display());
                continue;
            }
        };
        let modify_timestamp = modified_timestamp(&path)?;
        out.push(PluginDescriptor {
            name,
            modify_timestamp,
        });
    }

    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}
