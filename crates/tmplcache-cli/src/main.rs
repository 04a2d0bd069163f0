//! tmplcache binary.
//!
//! Loads a template root the same way an embedding server would, then either
//! prints one template, lists the cached keys, or keeps watching and logs
//! cache activity until interrupted.
//!
//! Usage:
//!   # Print a template
//!   tmplcache --root ./templates get layouts/base.html
//!
//!   # List cached keys, skipping editor droppings
//!   tmplcache --root ./templates --ignore .DS_Store list
//!
//!   # Watch with settings from a file (RUST_LOG=tmplcache=debug for per-event logs)
//!   tmplcache --config tmplcache.toml watch

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use tmplcache::{CacheConfig, TemplateCache};

/// Inspect or watch a template cache.
#[derive(Parser, Debug)]
#[command(name = "tmplcache")]
#[command(about = "Read-through template cache with filesystem watching")]
struct Args {
    /// TOML config file (root, watch, ignore)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template root directory (overrides the config file)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Basename to exclude from caching; repeatable
    #[arg(long = "ignore", value_name = "NAME")]
    ignore: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write one template's bytes to stdout
    Get {
        /// Root-relative template name
        name: String,
    },
    /// List cached template keys
    List,
    /// Keep the cache in sync until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `get` output stays clean on stdout
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Command::Get { name } => {
            let cache = TemplateCache::init(config.with_watch(false))?;
            let bytes = cache
                .get_template(&name)
                .with_context(|| format!("reading template {}", name))?;
            std::io::stdout().write_all(&bytes)?;
        }
        Command::List => {
            let cache = TemplateCache::init(config.with_watch(false))?;
            for key in cache.store().keys() {
                println!("{}", key);
            }
        }
        Command::Watch => {
            let cache = TemplateCache::init(config.with_watch(true))?;
            tracing::info!(
                root = %cache.root().display(),
                templates = cache.store().len(),
                watching = cache.is_watching(),
                "tmplcache ready, Ctrl+C to stop"
            );

            tokio::signal::ctrl_c().await?;

            cache.stop_watcher().await;
            let stats = cache.stats();
            tracing::info!(
                templates = cache.store().len(),
                applied = stats.events_applied,
                ignored = stats.events_ignored,
                dropped = stats.events_dropped,
                watch_errors = stats.watch_errors,
                "tmplcache shutting down"
            );
        }
    }

    Ok(())
}

/// Config file first, then command-line overrides.
fn resolve_config(args: &Args) -> Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::load(path)?,
        None => CacheConfig::default(),
    };
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    Ok(config.with_ignore(args.ignore.iter().cloned()))
}
