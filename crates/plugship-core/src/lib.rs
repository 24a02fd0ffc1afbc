//! # plugship-core
//!
//! Filesystem side of the plugin distribution service: enumerating plugin
//! directories, zipping them for transfer, unpacking them on the receiving
//! side, and the shared TOML configuration.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod protocol;

pub use config::*;

pub use archive::{build_archive, entry_names, extract_archive, PluginArchive};
pub use catalog::{is_plugin_name, list_plugins, modified_timestamp, plugin_dir, PluginDescriptor};
pub use error::{PlugshipError, PlugshipResult};
pub use protocol::{ErrorBody, ListResponse, UpdateRequest};
