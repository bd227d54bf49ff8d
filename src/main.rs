//! webcrawler main entry point
//!
//! This is the command-line interface for the concurrent web crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use webcrawler::config::{load_config_with_hash, validate, Config};
use webcrawler::crawler::{CrawlSummary, Crawler, HttpFetcher};
use webcrawler::output::{load_statistics, print_statistics};
use webcrawler::storage::{open_connections, SqliteStorage};

/// webcrawler: a concurrent web crawler
///
/// Starting from a seed URL, webcrawler fetches pages on a pool of worker
/// threads, stores their content and the link graph in SQLite, and follows
/// every newly discovered link until interrupted or until no URLs remain.
#[derive(Parser, Debug)]
#[command(name = "webcrawler")]
#[command(version)]
#[command(about = "A concurrent web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the seed URL from the configuration
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Override the number of worker threads
    #[arg(long, value_name = "N")]
    workers: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(seed) = cli.seed {
        config.crawler.seed = seed;
    }
    if let Some(workers) = cli.workers {
        config.crawler.workers = workers;
    }
    validate(&config).context("Invalid command-line override")?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("webcrawler=info,warn"),
            1 => EnvFilter::new("webcrawler=debug,info"),
            2 => EnvFilter::new("webcrawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== webcrawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Seed: {}", config.crawler.seed);
    println!("  Workers: {}", config.crawler.workers);
    println!(
        "  Storage connections: {}",
        config.crawler.connection_count()
    );
    println!(
        "  Connection acquire timeout: {}ms",
        config.crawler.acquire_timeout_ms
    );
    println!("  Max URL length: {}", config.crawler.max_url_length);
    println!(
        "  Progress interval: {} URLs",
        config.crawler.progress_interval
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
///
/// The crawl itself runs on a blocking thread; this task only waits for it
/// and turns Ctrl-C into a stop request.
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    let database_path = PathBuf::from(&config.output.database_path);

    let mut run_storage =
        SqliteStorage::new(&database_path).context("Failed to open database")?;
    let run_id = run_storage.start_run(&config_hash, &config.crawler.seed)?;
    let connections = open_connections(&database_path, config.crawler.connection_count())
        .context("Failed to open storage connections")?;
    tracing::info!(
        "Run {} recording to {} with {} connections",
        run_id,
        database_path.display(),
        connections.len()
    );

    let (handle_tx, handle_rx) = tokio::sync::oneshot::channel();
    let crawl = tokio::task::spawn_blocking(move || -> anyhow::Result<CrawlSummary> {
        let fetcher = HttpFetcher::new(&config.user_agent)?;
        let crawler = Crawler::new(&config.crawler, fetcher, connections)?;
        let _ = handle_tx.send(crawler.stop_handle());
        Ok(crawler.start(&config.crawler.seed)?)
    });

    let interrupt = tokio::spawn(async move {
        if let Ok(handle) = handle_rx.await {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, finishing in-flight pages");
                handle.stop();
            }
        }
    });

    let result = crawl.await.context("Crawl thread panicked")?;
    interrupt.abort();

    match result {
        Ok(summary) => {
            run_storage.finish_run(run_id, summary.stop_reason.as_str())?;
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            run_storage.finish_run(run_id, "failed")?;
            Err(e)
        }
    }
}

fn print_summary(summary: &CrawlSummary) {
    println!("\n=== Crawl Complete ===\n");
    println!("  Seed: {}", summary.seed);
    println!("  Stopped: {}", summary.stop_reason);
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!("  URLs dispatched: {}", summary.stats.dispatched);
    println!("  Pages fetched: {}", summary.stats.fetched);
    println!("  Fetch failures: {}", summary.stats.fetch_failures);
    println!("  Links discovered: {}", summary.stats.links_discovered);
    println!("  Links enqueued: {}", summary.stats.links_enqueued);
    println!("  Storage errors: {}", summary.stats.storage_errors);
    println!("  URLs seen: {}", summary.urls_seen);
    println!("  URLs left in queue: {}", summary.urls_pending);
}
