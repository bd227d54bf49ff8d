//! Page fetching
//!
//! The crawler retrieves page bodies through the [`Fetcher`] trait. The
//! shipped implementation, [`HttpFetcher`], wraps a blocking reqwest client
//! so that it can be called directly from worker threads.

use crate::config::UserAgentConfig;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Overall timeout for a single request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for establishing a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// Reasons a fetch can fail
///
/// Every variant abandons the URL for this crawl. Fetches are not retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timed out for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Request failed for {url}: {reason}")]
    Request { url: String, reason: String },

    #[error("Failed to read body of {url}: {reason}")]
    Body { url: String, reason: String },
}

impl FetchError {
    /// The URL whose fetch failed
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Timeout { url }
            | FetchError::Connect { url, .. }
            | FetchError::Request { url, .. }
            | FetchError::Body { url, .. } => url,
        }
    }
}

/// Retrieves the content of a page
///
/// Implementations are shared by every worker thread.
pub trait Fetcher: Send + Sync {
    /// Fetches `url` and returns its body as text
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url)
    }
}

/// Builds a blocking HTTP client with the crawler's user agent
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Overall timeout for each request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by a blocking reqwest client
///
/// The client must not be created, used or dropped from inside an async
/// runtime; construct it on the thread that runs the crawl.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the default request timeout
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeout(config, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a fetcher with a custom request timeout
    pub fn with_timeout(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config, timeout)?,
        })
    }

    /// Wraps an already configured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Maps a transport-level reqwest error onto a [`FetchError`]
fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    let url = url.to_string();
    if error.is_timeout() {
        FetchError::Timeout { url }
    } else if error.is_connect() {
        FetchError::Connect {
            url,
            reason: error.to_string(),
        }
    } else {
        FetchError::Request {
            url,
            reason: error.to_string(),
        }
    }
}
