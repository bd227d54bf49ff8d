//! Configuration module for the crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use webcrawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputConfig, UserAgentConfig, DEFAULT_ACQUIRE_TIMEOUT_MS,
    DEFAULT_MAX_URL_LENGTH, DEFAULT_PROGRESS_INTERVAL,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
