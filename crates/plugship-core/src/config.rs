use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PlugshipError, PlugshipResult};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "plugship.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory whose immediate subdirectories are the served plugins.
    pub plugins_root: PathBuf,
    /// File name hint sent in `Content-Disposition`, without the `.zip` suffix.
    pub archive_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8800,
            plugins_root: PathBuf::from("src"),
            archive_name: "plugin-server".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.archive_name)
    }

    /// Replace file values with any command-line values that were given.
    pub fn apply_overrides(
        &mut self,
        plugins_root: Option<PathBuf>,
        host: Option<String>,
        port: Option<u16>,
        archive_name: Option<String>,
    ) {
        if let Some(root) = plugins_root {
            self.plugins_root = root;
        }
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(name) = archive_name {
            self.archive_name = name;
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    /// Local directory holding one subdirectory per installed plugin.
    pub plugins_dir: PathBuf,
    /// Plugin names never touched by sync (the updater's own directory).
    pub exclude: Vec<String>,
}

impl ClientConfig {
    /// Replace file values with command-line values. A non-empty `exclude`
    /// replaces the configured list rather than extending it.
    pub fn apply_overrides(
        &mut self,
        server_url: Option<String>,
        plugins_dir: Option<PathBuf>,
        exclude: Vec<String>,
    ) {
        if let Some(url) = server_url {
            self.server_url = url;
        }
        if let Some(dir) = plugins_dir {
            self.plugins_dir = dir;
        }
        if !exclude.is_empty() {
            self.exclude = exclude;
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8800".to_string(),
            plugins_dir: PathBuf::from("."),
            exclude: vec!["PluginClient".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PlugshipConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl PlugshipConfig {
    pub fn load_from_file(path: &Path) -> PlugshipResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PlugshipError::io(path, e))?;
        toml::from_str(&contents).map_err(|e| PlugshipError::config(e.to_string(), path))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> PlugshipResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &Path) -> PlugshipResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| PlugshipError::config(e.to_string(), path))?;
        std::fs::write(path, contents).map_err(|e| PlugshipError::io(path, e))
    }
}
