//! Site-Crawler main entry point
//!
//! This is the command-line interface for the two-stage site crawler.

use clap::{Parser, Subcommand};
use site_crawler::config::{load_config_with_hash, Config};
use site_crawler::crawler::{fetch_loop, fetch_worker, process_loop, process_worker, seed};
use site_crawler::output::{load_statistics, print_statistics};
use site_crawler::queue::SqliteQueue;
use site_crawler::storage::{ContentStore, FsBlobStore, SqliteMetadataStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Site-Crawler: a two-stage distributed web crawler
///
/// The fetch stage pulls links from the fetch topic and stores changed
/// pages; the processing stage extracts text and links from stored pages
/// and feeds the links back to the fetch topic.
#[derive(Parser, Debug)]
#[command(name = "site-crawler")]
#[command(version)]
#[command(about = "A two-stage distributed web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "crawler.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the fetch worker until interrupted
    Fetch,

    /// Run the processing worker until interrupted
    Process,

    /// Publish seed links onto the fetch topic
    Seed {
        /// Links to seed
        #[arg(value_name = "URL", required = true)]
        links: Vec<String>,
    },

    /// Show record and topic statistics and exit
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

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

    match cli.command {
        Command::Fetch => handle_fetch(&config).await?,
        Command::Process => handle_process(&config).await?,
        Command::Seed { links } => handle_seed(&config, &links).await?,
        Command::Stats => handle_stats(&config).await?,
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
            0 => EnvFilter::new("site_crawler=info,warn"),
            1 => EnvFilter::new("site_crawler=debug,info"),
            2 => EnvFilter::new("site_crawler=trace,debug"),
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

fn open_queue(config: &Config) -> Result<Arc<SqliteQueue>, Box<dyn std::error::Error>> {
    let queue = SqliteQueue::new(
        Path::new(&config.queue.database_path),
        config.queue.partitions,
    )?;
    Ok(Arc::new(queue))
}

fn open_content_store(config: &Config) -> Result<ContentStore, Box<dyn std::error::Error>> {
    let metadata = SqliteMetadataStore::new(Path::new(&config.metadata.database_path))?;
    let blobs = FsBlobStore::new(&config.blobs.root);
    Ok(ContentStore::new(Arc::new(metadata), Arc::new(blobs)))
}

/// Resolves once Ctrl-C is received
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Interrupt received, stopping after the current batch");
}

/// Handles the fetch command: runs the fetch worker
async fn handle_fetch(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_queue(config)?;
    let store = open_content_store(config)?;

    let worker = fetch_worker(config, queue.clone(), store)?;
    let consume = fetch_loop(config, queue);

    match consume.run(&worker, shutdown_signal()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("Fetch worker stopped: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the process command: runs the processing worker
async fn handle_process(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_queue(config)?;
    let store = open_content_store(config)?;

    let worker = process_worker(config, queue.clone(), store);
    let consume = process_loop(config, queue);

    match consume.run(&worker, shutdown_signal()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("Processing worker stopped: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the seed command: publishes links onto the fetch topic
async fn handle_seed(config: &Config, links: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_queue(config)?;
    let published = seed(queue.as_ref(), &config.queue.fetch_topic, links).await?;

    println!(
        "✓ Seeded {} of {} links onto {}",
        published,
        links.len(),
        config.queue.fetch_topic
    );
    Ok(())
}

/// Handles the stats command: shows statistics from the stores
async fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Queue database: {}", config.queue.database_path);
    println!("Metadata database: {}\n", config.metadata.database_path);

    let queue = open_queue(config)?;
    let metadata = SqliteMetadataStore::new(Path::new(&config.metadata.database_path))?;

    let stats = load_statistics(config, &metadata, queue.as_ref()).await?;
    print_statistics(&stats);

    Ok(())
}
