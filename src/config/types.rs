use serde::Deserialize;
use std::time::Duration;

/// Longest URL (in characters) admitted to the frontier
pub const DEFAULT_MAX_URL_LENGTH: usize = 500;

/// How long a worker waits for a storage connection before giving up
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;

/// Number of dispatched URLs between progress log lines
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 50;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// URL the crawl starts from
    pub seed: String,

    /// Number of worker threads
    pub workers: u32,

    /// Number of pooled storage connections (defaults to the worker count)
    #[serde(default)]
    pub connections: Option<u32>,

    /// Maximum wait for a storage connection (milliseconds)
    #[serde(rename = "acquire-timeout-ms", default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Discovered URLs longer than this are dropped
    #[serde(rename = "max-url-length", default = "default_max_url_length")]
    pub max_url_length: usize,

    /// Dispatched URLs between progress reports
    #[serde(rename = "progress-interval", default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl CrawlerConfig {
    /// Creates a crawler configuration with defaults for everything but the
    /// seed and the worker count
    pub fn new(seed: impl Into<String>, workers: u32) -> Self {
        Self {
            seed: seed.into(),
            workers,
            connections: None,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Size of the storage connection pool
    pub fn connection_count(&self) -> usize {
        self.connections.unwrap_or(self.workers) as usize
    }

    /// Bounded wait applied to connection checkout
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

fn default_acquire_timeout_ms() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_MS
}

fn default_max_url_length() -> usize {
    DEFAULT_MAX_URL_LENGTH
}

fn default_progress_interval() -> u64 {
    DEFAULT_PROGRESS_INTERVAL
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
