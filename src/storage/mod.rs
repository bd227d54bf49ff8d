//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Page content and link-graph persistence
//! - Run tracking
//! - Pooling of storage connections across worker threads

mod pool;
mod schema;
mod sqlite;
mod traits;

pub use pool::{ConnectionId, ConnectionPool, PoolError, PooledConnection};
pub use sqlite::{open_connections, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

/// A stored page
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub url: String,
    pub host: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub content_length: i64,
    pub fetched_at: String,
}

/// A crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub seed: String,
    pub stop_reason: Option<String>,
}
