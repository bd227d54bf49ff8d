//! Per-URL work executed on a worker thread
//!
//! Each dispatched URL is fetched, stored, parsed, and its links fed back to
//! the frontier. Every failure is contained here: it is logged, counted, and
//! the task ends normally.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::{extract_links, parse_document};
use crate::output::CrawlStats;
use crate::storage::{ConnectionPool, Storage};
use crate::url::PageUrl;
use std::sync::Arc;

/// Fetch, persist, parse and enqueue for a single URL
pub struct PageProcessor<F, S> {
    fetcher: F,
    connections: Arc<ConnectionPool<S>>,
    frontier: Arc<Frontier>,
    stats: Arc<CrawlStats>,
}

impl<F: Fetcher, S: Storage> PageProcessor<F, S> {
    pub fn new(
        fetcher: F,
        connections: Arc<ConnectionPool<S>>,
        frontier: Arc<Frontier>,
        stats: Arc<CrawlStats>,
    ) -> Self {
        Self {
            fetcher,
            connections,
            frontier,
            stats,
        }
    }

    /// Processes one URL
    ///
    /// 1. Fetch the page; on failure the URL is abandoned (it stays seen)
    /// 2. Store the content
    /// 3. Parse and extract links; unparsable content yields no links
    /// 4. For each link within the length cap that the frontier has not seen,
    ///    record the edge and enqueue it
    pub fn process(&self, url: &str) {
        tracing::debug!("Processing URL: {}", url);

        let content = match self.fetcher.fetch(url) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Fetch failed for {}: {}", url, e);
                self.stats.record_fetch_failure();
                return;
            }
        };
        self.stats.record_fetched();

        self.store_content(url, &content);

        let links = self.links_in(url, &content);
        self.stats.record_links_discovered(links.len() as u64);

        self.admit_links(url, &links);
    }

    fn store_content(&self, url: &str, content: &str) {
        let mut conn = match self.connections.acquire() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Not storing content of {}: {}", url, e);
                self.stats.record_storage_error();
                return;
            }
        };

        if let Err(e) = conn.insert_content(url, content) {
            if e.is_duplicate() {
                tracing::debug!("Content for {} already stored", url);
            } else {
                tracing::warn!("Failed to store content of {}: {}", url, e);
            }
            self.stats.record_storage_error();
        }
    }

    fn links_in(&self, url: &str, content: &str) -> Vec<String> {
        let base = match PageUrl::parse(url) {
            Ok(base) => base,
            Err(e) => {
                tracing::debug!("Cannot resolve links against {}: {}", url, e);
                return Vec::new();
            }
        };

        match parse_document(content) {
            Ok(document) => extract_links(&document, &base),
            Err(e) => {
                tracing::debug!("Failed to parse HTML for {}: {}", url, e);
                Vec::new()
            }
        }
    }

    fn admit_links(&self, url: &str, links: &[String]) {
        if links.is_empty() {
            return;
        }

        let mut conn = match self.connections.acquire() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Dropping {} links from {}: {}", links.len(), url, e);
                self.stats.record_storage_error();
                return;
            }
        };

        let max_len = self.frontier.max_url_length();
        for link in links {
            if link.chars().count() > max_len {
                tracing::debug!("Skipping oversized URL ({} chars) on {}", link.len(), url);
                continue;
            }

            let admitted = self.frontier.push_with(link, |link| {
                if let Err(e) = conn.insert_link(url, link) {
                    if e.is_duplicate() {
                        tracing::debug!("Edge {} -> {} already recorded", url, link);
                    } else {
                        tracing::warn!("Failed to record edge {} -> {}: {}", url, link, e);
                    }
                    self.stats.record_storage_error();
                }
            });

            if admitted {
                tracing::trace!("Enqueued {}", link);
                self.stats.record_link_enqueued();
            }
        }
    }
}
