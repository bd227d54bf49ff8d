//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait,
//! plus the read-side queries used for crawl statistics.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{ContentRecord, RunRecord};
use crate::url::host_of;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage backend
///
/// One `SqliteStorage` is one connection. Several connections may be opened
/// on the same database file; WAL mode lets readers and a writer proceed
/// concurrently.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    // ===== Run Management =====

    /// Records the start of a crawl run and returns its ID
    pub fn start_run(&mut self, config_hash: &str, seed: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, seed) VALUES (?1, ?2, ?3)",
            params![now, config_hash, seed],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Marks a run as finished with the reason the crawl stopped
    pub fn finish_run(&mut self, run_id: i64, stop_reason: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, stop_reason = ?2 WHERE id = ?3",
            params![now, stop_reason, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("run {}", run_id)));
        }
        Ok(())
    }

    /// Gets the most recent run
    pub fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, seed, stop_reason
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        seed: row.get(4)?,
                        stop_reason: row.get(5)?,
                    })
                },
            )
            .optional()?;

        Ok(run)
    }

    // ===== Read Side =====

    /// Gets the stored content record for a URL
    pub fn get_content(&self, url: &str) -> StorageResult<Option<ContentRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT url, host, content, content_hash, content_length, fetched_at
                 FROM pages WHERE url = ?1",
                params![url],
                |row| {
                    Ok(ContentRecord {
                        url: row.get(0)?,
                        host: row.get(1)?,
                        content: row.get(2)?,
                        content_hash: row.get(3)?,
                        content_length: row.get(4)?,
                        fetched_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    /// Gets every link target recorded for a page, in discovery order
    pub fn get_outgoing_links(&self, from_url: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT to_url FROM links WHERE from_url = ?1 ORDER BY id")?;

        let links = stmt
            .query_map(params![from_url], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(links)
    }

    /// Counts stored pages
    pub fn count_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Counts link-graph edges
    pub fn count_links(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Counts distinct hosts among stored pages
    pub fn count_hosts(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT host) FROM pages", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    /// Sums the byte length of all stored content
    pub fn total_content_bytes(&self) -> StorageResult<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(content_length), 0) FROM pages",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }
}

impl Storage for SqliteStorage {
    fn insert_content(&mut self, url: &str, content: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let hash = hex::encode(Sha256::digest(content.as_bytes()));
        self.conn.execute(
            "INSERT INTO pages (url, host, content, content_hash, content_length, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![url, host_of(url), content, hash, content.len() as i64, now],
        )?;
        Ok(())
    }

    fn insert_link(&mut self, from_url: &str, to_url: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO links (from_url, to_url, discovered_at) VALUES (?1, ?2, ?3)",
            params![from_url, to_url, now],
        )?;
        Ok(())
    }
}

/// Opens `count` connections on the database at `path`
///
/// The returned connections are meant to be handed to a
/// [`ConnectionPool`](crate::storage::ConnectionPool).
pub fn open_connections(path: &Path, count: usize) -> StorageResult<Vec<SqliteStorage>> {
    (0..count).map(|_| SqliteStorage::new(path)).collect()
}
