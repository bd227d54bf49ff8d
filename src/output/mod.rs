//! Output module for crawl statistics
//!
//! This module handles:
//! - Live counters shared by the dispatch loop and the workers
//! - Reading statistics back from a crawl database and printing them

pub mod stats;

pub use stats::{
    load_statistics, print_statistics, run_duration_seconds, CrawlStats, StatsSnapshot,
    StoredStatistics,
};
