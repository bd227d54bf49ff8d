//! Crawler module for concurrent page fetching and processing
//!
//! This module contains the core crawling machinery, including:
//! - The frontier of pending URLs and the seen-set
//! - A fixed pool of worker threads
//! - Page fetching and HTML link extraction
//! - Per-URL processing and the dispatch loop that drives it

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod processor;
mod stop;
mod workers;

pub use coordinator::{CrawlSummary, Crawler, Phase, StopHandle, StopReason};
pub use fetcher::{
    build_http_client, FetchError, Fetcher, HttpFetcher, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use frontier::{Frontier, Wake};
pub use parser::{extract_links, parse_document, ParseError};
pub use processor::PageProcessor;
pub use stop::StopToken;
pub use workers::{IdleHook, WorkerPool};
