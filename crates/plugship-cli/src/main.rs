use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use plugship::{client, server};
use plugship_core::PlugshipConfig;

#[derive(Parser)]
#[command(
    name = "plugship",
    version,
    about = "plugship: plugin distribution server and updater",
    long_about = "Serves a directory of plugins over HTTP and keeps local plugin folders in sync with it.\n\nThe server lists plugin directories with their modification times and\nstreams zip archives of the requested plugins."
)]
struct Cli {
    /// Path to the config file (default: plugship.toml in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the distribution server
    Serve {
        /// Directory whose subdirectories are the served plugins
        #[arg(long)]
        root: Option<PathBuf>,

        /// Address to listen on
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Download file name hint, without the .zip suffix
        #[arg(long)]
        archive_name: Option<String>,
    },

    /// Print the plugins found under a root as JSON
    List {
        /// Plugins root (default: server.plugins_root from config)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Write an archive of the named plugins to a file
    Pack {
        /// Plugin names to include; unknown names are skipped
        #[arg(required = true)]
        names: Vec<String>,

        /// Plugins root (default: server.plugins_root from config)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Output zip path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Download new or changed plugins from a server into a local plugins dir
    Sync {
        /// Server base URL (e.g. http://10.0.0.5:8800)
        #[arg(long)]
        server: Option<String>,

        /// Local plugins directory
        #[arg(long)]
        plugins_dir: Option<PathBuf>,

        /// Plugin names to leave untouched (repeatable, replaces config list)
        #[arg(long)]
        exclude: Vec<String>,

        /// Only print what would be downloaded
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(plugship_core::DEFAULT_CONFIG_FILE));
    let config = PlugshipConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load config: {}", config_path.display()))?;

    match cli.command {
        Commands::Serve {
            root,
            host,
            port,
            archive_name,
        } => {
            let mut server_cfg = config.server;
            server_cfg.apply_overrides(root, host, port, archive_name);
            run_async(server::run_server(server_cfg))
        }
        Commands::List { root } => cmd_list(root.unwrap_or(config.server.plugins_root)),
        Commands::Pack {
            names,
            root,
            output,
        } => cmd_pack(root.unwrap_or(config.server.plugins_root), &names, &output),
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Sync {
            server,
            plugins_dir,
            exclude,
            dry_run,
        } => {
            let mut client_cfg = config.client;
            client_cfg.apply_overrides(server, plugins_dir, exclude);
            let opts = client::SyncOptions {
                server_url: client_cfg.server_url,
                plugins_dir: client_cfg.plugins_dir,
                exclude: client_cfg.exclude,
                dry_run,
            };
            cmd_sync(&opts)
        }
    }
}

fn run_async<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;
    runtime.block_on(future)
}

fn cmd_list(root: PathBuf) -> Result<()> {
    let plugins = plugship_core::list_plugins(&root)
        .with_context(|| format!("failed to list plugins in {}", root.display()))?;
    let body = plugship_core::ListResponse { plugins };
    println!(
        "{}",
        serde_json::to_string_pretty(&body).context("failed to serialize plugin list")?
    );
    Ok(())
}

fn cmd_pack(root: PathBuf, names: &[String], output: &Path) -> Result<()> {
    let archive = plugship_core::build_archive(&root, names)
        .with_context(|| format!("failed to archive plugins from {}", root.display()))?;
    std::fs::write(output, &archive.bytes)
        .with_context(|| format!("failed to write archive: {}", output.display()))?;

    println!(
        "✓ Packed {} plugin(s), {} file(s) -> {}",
        archive.plugins.len(),
        archive.entries,
        output.display()
    );
    for name in &archive.skipped {
        println!("   skipped unknown plugin '{}'", name);
    }
    Ok(())
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "config already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    PlugshipConfig::default()
        .save_to_file(path)
        .with_context(|| format!("failed to write config: {}", path.display()))?;
    println!("✓ Wrote {}", path.display());
    Ok(())
}

fn cmd_sync(opts: &client::SyncOptions) -> Result<()> {
    let report = match client::sync(opts) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("update cancelled: {:#}", e);
            return Err(e.context("update cancelled"));
        }
    };

    if report.updated.is_empty() {
        println!("✓ All plugins are up to date");
    } else if opts.dry_run {
        println!("Would update: {}", report.updated.join(", "));
    } else {
        println!(
            "✓ Updated {} ({} files). Reload plugins in the host application.",
            report.updated.join(", "),
            report.files_written
        );
    }
    Ok(())
}
