//! Skeleton discovery main entry point
//!
//! Command-line interface for queueing website discoveries, running the
//! worker and inspecting results.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use skeleton_discovery::cache::{load_snapshot, SqliteSnapshotCache};
use skeleton_discovery::config::{load_config_with_hash, Config};
use skeleton_discovery::storage::{open_storage, NewDiscovery, Storage};
use skeleton_discovery::url::parse_homepage;
use skeleton_discovery::{Coordinator, DiscoveryStatus, ExecutionMode, Worker};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Skeleton discovery: maps a website's structure from its homepage
///
/// Combines sitemaps, robots.txt and navigation links into a prioritized
/// list of the site's key pages.
#[derive(Parser, Debug)]
#[command(name = "skeleton-discovery")]
#[command(version)]
#[command(about = "Discovers the page skeleton of a website", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a discovery for a homepage and queue its job
    Enqueue {
        /// Homepage URL to discover
        homepage: String,

        /// Maximum number of pages to keep
        #[arg(long)]
        max_pages: Option<u32>,

        /// Maximum page depth (0 = sitemap only, 1 = include navigation)
        #[arg(long)]
        max_depth: Option<u32>,

        /// Session the discovery belongs to
        #[arg(long)]
        session: Option<String>,

        /// Mark the discovery as manually requested
        #[arg(long)]
        manual: bool,
    },

    /// Process queued jobs
    Work {
        /// Exit once no job is queued instead of polling forever
        #[arg(long)]
        once: bool,
    },

    /// Print a discovery and its pages as JSON
    Status {
        /// Discovery id
        id: String,
    },

    /// Cancel a pending or running discovery
    Cancel {
        /// Discovery id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let config = Arc::new(config);

    match cli.command {
        Command::Enqueue {
            homepage,
            max_pages,
            max_depth,
            session,
            manual,
        } => {
            let homepage = parse_homepage(&homepage)
                .with_context(|| format!("invalid homepage URL: {}", homepage))?;
            let new = NewDiscovery {
                homepage_url: homepage.to_string(),
                mode: if manual {
                    ExecutionMode::Manual
                } else {
                    ExecutionMode::Auto
                },
                max_pages: max_pages.unwrap_or(config.discovery.default_max_pages),
                max_depth: max_depth.unwrap_or(config.discovery.default_max_depth),
                session_id: session,
            };
            handle_enqueue(&config, &new)?;
        }
        Command::Work { once } => handle_work(&config, once).await?,
        Command::Status { id } => handle_status(&config, &id)?,
        Command::Cancel { id } => handle_cancel(&config, &id)?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("skeleton_discovery=info,warn"),
            1 => EnvFilter::new("skeleton_discovery=debug,info"),
            2 => EnvFilter::new("skeleton_discovery=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn build_worker(config: &Arc<Config>) -> anyhow::Result<Worker> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open database {}", config.output.database_path))?;
    let cache = Arc::new(open_cache(config)?);
    let coordinator = Coordinator::new(Arc::clone(config), Arc::new(Mutex::new(storage)), cache)
        .context("failed to initialize coordinator")?;

    Ok(Worker::new(config, coordinator))
}

/// Opens the snapshot cache shared by the worker and `status`
fn open_cache(config: &Config) -> anyhow::Result<SqliteSnapshotCache> {
    let ttl = chrono::Duration::hours(config.cache.ttl_hours as i64);
    SqliteSnapshotCache::open(Path::new(&config.output.database_path), ttl)
        .with_context(|| format!("failed to open cache in {}", config.output.database_path))
}

fn handle_enqueue(config: &Arc<Config>, new: &NewDiscovery) -> anyhow::Result<()> {
    let worker = build_worker(config)?;
    let request = worker.request_discovery(new)?;
    println!("{}", request.discovery_id);
    Ok(())
}

async fn handle_work(config: &Arc<Config>, once: bool) -> anyhow::Result<()> {
    let worker = build_worker(config)?;

    if once {
        let outcomes = worker.run_until_idle().await?;
        tracing::info!("Queue drained after {} job runs", outcomes.len());
        return Ok(());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    worker.run(shutdown).await?;
    Ok(())
}

fn handle_status(config: &Config, id: &str) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open database {}", config.output.database_path))?;
    let cache = open_cache(config)?;

    let Some(snapshot) = load_snapshot(&storage, &cache, id)? else {
        bail!("discovery {} not found", id);
    };

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn handle_cancel(config: &Config, id: &str) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open database {}", config.output.database_path))?;

    storage
        .update_status(id, DiscoveryStatus::Cancelled, None)
        .with_context(|| format!("failed to cancel discovery {}", id))?;

    tracing::info!("Discovery {} cancelled", id);
    Ok(())
}
