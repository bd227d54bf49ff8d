//! Crawl statistics
//!
//! Two views of a crawl: [`CrawlStats`], live counters updated by the workers
//! and the dispatch loop while a crawl runs, and [`StoredStatistics`], read
//! back from the database after the fact.

use crate::storage::{RunRecord, SqliteStorage, StorageResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for a running crawl
///
/// Shared between the dispatch loop and every worker. Counters only grow.
#[derive(Debug, Default)]
pub struct CrawlStats {
    dispatched: AtomicU64,
    fetched: AtomicU64,
    fetch_failures: AtomicU64,
    links_discovered: AtomicU64,
    links_enqueued: AtomicU64,
    storage_errors: AtomicU64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `count` URLs handed to the worker pool, returning the new total
    pub fn record_dispatched(&self, count: u64) -> u64 {
        self.dispatched.fetch_add(count, Ordering::Relaxed) + count
    }

    pub fn record_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_links_discovered(&self, count: u64) {
        self.links_discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_link_enqueued(&self) {
        self.links_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            links_discovered: self.links_discovered.load(Ordering::Relaxed),
            links_enqueued: self.links_enqueued.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CrawlStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// URLs submitted to the worker pool, the seed included
    pub dispatched: u64,

    /// Pages fetched successfully
    pub fetched: u64,

    /// Fetches that failed
    pub fetch_failures: u64,

    /// Links found on fetched pages, before deduplication
    pub links_discovered: u64,

    /// Links admitted to the frontier
    pub links_enqueued: u64,

    /// Failed content or edge inserts, plus connection acquire timeouts
    pub storage_errors: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dispatched={} fetched={} fetch_failures={} links_discovered={} links_enqueued={} storage_errors={}",
            self.dispatched,
            self.fetched,
            self.fetch_failures,
            self.links_discovered,
            self.links_enqueued,
            self.storage_errors
        )
    }
}

/// Statistics of a crawl database
#[derive(Debug, Clone)]
pub struct StoredStatistics {
    /// Number of stored pages
    pub total_pages: u64,

    /// Number of distinct hosts among stored pages
    pub unique_hosts: u64,

    /// Number of link-graph edges
    pub total_links: u64,

    /// Sum of stored content lengths in bytes
    pub total_content_bytes: u64,

    /// The most recent crawl run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The database to query
///
/// # Returns
///
/// * `Ok(StoredStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> StorageResult<StoredStatistics> {
    Ok(StoredStatistics {
        total_pages: storage.count_pages()?,
        unique_hosts: storage.count_hosts()?,
        total_links: storage.count_links()?,
        total_content_bytes: storage.total_content_bytes()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Duration of a finished run in whole seconds
pub fn run_duration_seconds(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<DateTime<Utc>>().ok()?;
    let finished = run.finished_at.as_ref()?.parse::<DateTime<Utc>>().ok()?;
    Some((finished - started).num_seconds())
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoredStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Pages stored: {}", stats.total_pages);
    println!("  Unique hosts: {}", stats.unique_hosts);
    println!("  Links recorded: {}", stats.total_links);
    println!("  Content stored: {} bytes", stats.total_content_bytes);

    let average = if stats.total_pages > 0 {
        stats.total_links as f64 / stats.total_pages as f64
    } else {
        0.0
    };
    println!("  Links per page: {:.1}", average);
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run (#{}):", run.id);
            println!("  Seed: {}", run.seed);
            println!("  Started: {}", run.started_at);
            match &run.finished_at {
                Some(finished) => println!("  Finished: {}", finished),
                None => println!("  Finished: (still running or interrupted)"),
            }
            if let Some(seconds) = run_duration_seconds(run) {
                println!("  Duration: {}s", seconds);
            }
            if let Some(reason) = &run.stop_reason {
                println!("  Stop reason: {}", reason);
            }
            println!("  Config hash: {}", run.config_hash);
        }
        None => println!("No crawl runs recorded."),
    }
}
