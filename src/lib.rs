//! webcrawler: a concurrent web crawler core
//!
//! This crate maintains a frontier of URLs to visit, dispatches fetch-and-parse
//! work across a fixed pool of worker threads, deduplicates discovered links,
//! and persists page content and link-graph edges through a bounded pool of
//! storage connections.

pub mod config;
pub mod crawler;
pub mod output;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("HTML parse error: {0}")]
    Parse(#[from] crawler::ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] storage::PoolError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to spawn worker thread: {0}")]
    Worker(#[source] std::io::Error),

    #[error("Crawler has already been started")]
    AlreadyStarted,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use crate::config::Config;
pub use crate::crawler::{Crawler, Fetcher, HttpFetcher};
pub use crate::storage::{SqliteStorage, Storage};
pub use crate::url::{normalize_url, PageUrl};
