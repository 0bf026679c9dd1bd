//! Grid-Loader main entry point
//!
//! This is the command-line interface for the Grid-Loader worker.

use clap::Parser;
use grid_loader::config::{load_config_with_hash, Config};
use grid_loader::listener::{setup_signal_handler, Broker, SpoolBroker};
use grid_loader::memory::{MemoryMonitor, SystemMemory};
use grid_loader::storage::{open_store, AssetStore};
use grid_loader::Listener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Grid-Loader: the loader stage of a crawl/index pipeline
///
/// Grid-Loader consumes loader job messages, retrieves the pages they name
/// (rendering them in a headless browser when the crawl allows it) and hands
/// the resulting WARC asset to the next stage of the pipeline.
#[derive(Parser, Debug)]
#[command(name = "grid-loader")]
#[command(version = "1.0.0")]
#[command(about = "Loader worker for a crawl/index pipeline", long_about = None)]
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

    /// Process the messages currently in the spool inbox, then exit
    #[arg(long)]
    once: bool,

    /// Validate config and show the resolved settings without loading anything
    #[arg(long, conflicts_with_all = ["once", "stats"])]
    dry_run: bool,

    /// Show asset store statistics and exit
    #[arg(long, conflicts_with_all = ["once", "dry_run"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config).await?;
    } else {
        handle_listen(config, cli.once).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("grid_loader=info,warn"),
            1 => EnvFilter::new("grid_loader=debug,info"),
            2 => EnvFilter::new("grid_loader=trace,debug"),
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

/// Handles the --dry-run mode: prints the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Grid-Loader Dry Run ===\n");

    println!("Loader:");
    println!("  Queue: {}", config.loader.queue);
    println!("  Workers: {}", config.loader.worker_count());
    println!(
        "  Headless rendering: {}",
        if config.loader.disable_headless {
            "disabled"
        } else {
            "allowed per crawl"
        }
    );

    println!("\nUser Agent:");
    println!("  Kind: {:?}", config.user_agent.kind);
    println!("  String: {}", config.user_agent.user_agent());

    println!("\nRender:");
    println!("  Cache capacity: {}", config.render.cache_capacity);
    println!("  Cache horizon: {}s", config.render.cache_horizon_secs);
    println!("  Timeout: {}s", config.render.timeout_secs);
    match &config.render.chrome_path {
        Some(path) => println!("  Browser: {}", path.display()),
        None => println!("  Browser: auto-detect"),
    }

    println!("\nHTTP:");
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Connect timeout: {}s", config.http.connect_timeout_secs);

    println!("\nMemory:");
    println!("  Short below: {:.0}% available", config.memory.short_ratio * 100.0);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nBroker:");
    println!("  Spool: {}", config.broker.spool_dir);
    println!("  Poll interval: {}ms", config.broker.poll_interval_ms);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows asset store statistics
async fn handle_stats(config: &Config) -> grid_loader::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let store = open_store(Path::new(&config.storage.database_path))?;
    println!("Stored assets: {}", store.asset_count().await?);

    Ok(())
}

/// Handles the main listening operation
async fn handle_listen(config: Config, once: bool) -> grid_loader::Result<()> {
    let mut spool = SpoolBroker::open(
        Path::new(&config.broker.spool_dir),
        Duration::from_millis(config.broker.poll_interval_ms),
    )
    .await?;
    if once {
        tracing::info!("Draining spool inbox once");
        spool = spool.draining();
    }
    let broker: Arc<dyn Broker> = Arc::new(spool);

    let store: Arc<dyn AssetStore> =
        Arc::new(open_store(Path::new(&config.storage.database_path))?);
    let memory: Arc<dyn MemoryMonitor> = Arc::new(SystemMemory::new(config.memory.short_ratio));

    let listener = Listener::from_config(&config, broker, store, memory)?;
    setup_signal_handler(listener.shutdown_token());

    match listener.run().await {
        Ok(()) => {
            tracing::info!("Loader stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Loader failed: {}", e);
            Err(e)
        }
    }
}
