use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, Response};

use plugship_core::{
    entry_names, extract_archive, is_plugin_name, modified_timestamp, ErrorBody, ListResponse,
    PluginDescriptor, UpdateRequest,
};

pub struct SyncOptions {
    pub server_url: String,
    pub plugins_dir: PathBuf,
    pub exclude: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    /// Plugins that were (or, on a dry run, would be) downloaded.
    pub updated: Vec<String>,
    pub files_written: usize,
}

/// Thin HTTP client for the two distribution routes.
pub struct UpdateClient {
    client: Client,
    base_url: String,
}

impl UpdateClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn fetch_list(&self) -> Result<Vec<PluginDescriptor>> {
        let url = format!("{}/list", self.base_url);
        let res = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("failed to reach plugin server: {}", url))?;
        let body: ListResponse = check_status(res)?
            .json()
            .context("failed to decode plugin list")?;
        Ok(body.plugins)
    }

    pub fn fetch_archive(&self, names: &[String]) -> Result<Vec<u8>> {
        let url = format!("{}/update", self.base_url);
        let req = UpdateRequest {
            download_list: names.to_vec(),
        };
        let res = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .with_context(|| format!("failed to reach plugin server: {}", url))?;
        let bytes = check_status(res)?
            .bytes()
            .context("failed to read plugin archive")?;
        Ok(bytes.to_vec())
    }
}

fn check_status(res: Response) -> Result<Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);
    Err(anyhow!("plugin server returned {}: {}", status, message))
}

/// Decide which server plugins must be downloaded into `local_root`.
///
/// A plugin is fetched when it is missing locally or its local directory is
/// strictly older than the server's copy. Excluded names are never fetched.
pub fn plan_downloads(
    local_root: &Path,
    server: &[PluginDescriptor],
    exclude: &[String],
) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for desc in server {
        if exclude.iter().any(|e| e == &desc.name) {
            continue;
        }
        if !is_plugin_name(&desc.name) {
            tracing::warn!("ignoring invalid plugin name from server: {:?}", desc.name);
            continue;
        }

        let local = local_root.join(&desc.name);
        if !local.is_dir() {
            out.push(desc.name.clone());
            continue;
        }
        let local_ts = modified_timestamp(&local)?;
        if local_ts < desc.modify_timestamp {
            out.push(desc.name.clone());
        }
    }
    Ok(out)
}

/// Make `dir` an existing, empty directory.
fn reset_plugin_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        std::fs::remove_file(dir)
            .with_context(|| format!("failed to remove file: {}", dir.display()))?;
    }
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create plugin dir: {}", dir.display()))?;
        return Ok(());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read plugin dir: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove dir: {}", path.display()))?;
        } else {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove file: {}", path.display()))?;
        }
    }
    Ok(())
}

/// Check every entry before anything local changes, and return the
/// requested plugins the archive actually contains.
///
/// Entries outside the requested plugins, or that would escape the plugins
/// root, reject the whole archive.
fn verify_archive(bytes: &[u8], requested: &[String]) -> Result<HashSet<String>> {
    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let mut present = HashSet::new();
    for name in entry_names(bytes).context("downloaded archive failed validation")? {
        match name.split_once('/') {
            Some((top, _)) if requested.contains(top) => {
                present.insert(top.to_string());
            }
            _ => anyhow::bail!("archive entry outside requested plugins: {}", name),
        }
    }
    Ok(present)
}

/// Bring `opts.plugins_dir` up to date with the server.
///
/// Nothing local changes until the whole archive is downloaded and checked.
pub fn sync(opts: &SyncOptions) -> Result<SyncReport> {
    if !opts.plugins_dir.is_dir() {
        anyhow::bail!(
            "local plugins dir does not exist: {}",
            opts.plugins_dir.display()
        );
    }

    let client = UpdateClient::new(&opts.server_url)?;
    let server_plugins = client.fetch_list()?;
    let download_list = plan_downloads(&opts.plugins_dir, &server_plugins, &opts.exclude)?;

    if download_list.is_empty() {
        tracing::info!("all plugins up to date");
        return Ok(SyncReport::default());
    }
    if opts.dry_run {
        return Ok(SyncReport {
            updated: download_list,
            files_written: 0,
        });
    }

    tracing::info!("downloading {} plugin(s): {:?}", download_list.len(), download_list);
    let bytes = client.fetch_archive(&download_list)?;
    let present = verify_archive(&bytes, &download_list)?;

    let (updated, missing): (Vec<String>, Vec<String>) = download_list
        .into_iter()
        .partition(|name| present.contains(name));
    if !missing.is_empty() {
        tracing::warn!("server sent no files for {:?}; leaving them as they are", missing);
    }

    for name in &updated {
        reset_plugin_dir(&opts.plugins_dir.join(name))?;
    }
    let written = extract_archive(&bytes, &opts.plugins_dir).with_context(|| {
        format!(
            "failed to extract plugin archive into {}",
            opts.plugins_dir.display()
        )
    })?;

    Ok(SyncReport {
        updated,
        files_written: written.len(),
    })
}
