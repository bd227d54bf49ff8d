//! Crawl orchestration
//!
//! The [`Crawler`] owns the frontier, the worker pool and the connection
//! pool. Its dispatch loop runs on the thread that calls
//! [`start`](Crawler::start): it sleeps on the frontier until URLs and idle
//! workers are both available, then hands one URL to each idle worker.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::frontier::{Frontier, Wake};
use crate::crawler::processor::PageProcessor;
use crate::crawler::stop::StopToken;
use crate::crawler::workers::WorkerPool;
use crate::output::{CrawlStats, StatsSnapshot};
use crate::storage::{ConnectionPool, Storage};
use crate::url::PageUrl;
use crate::{ConfigError, CrawlError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a crawler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, not started
    Idle,
    /// Dispatch loop active
    Running,
    /// Dispatch loop has exited; in-flight work is finishing
    Stopping,
    /// All workers have finished
    Stopped,
}

/// Why a crawl ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// The frontier emptied with every worker idle
    Exhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Requested => "requested",
            StopReason::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// The normalized seed URL
    pub seed: String,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
    /// URLs admitted to the frontier over the crawl, the seed included
    pub urls_seen: usize,
    /// URLs still queued when the crawl ended
    pub urls_pending: usize,
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "crawl of {} {} after {:.1}s: {} (seen={} pending={})",
            self.seed,
            self.stop_reason,
            self.elapsed.as_secs_f64(),
            self.stats,
            self.urls_seen,
            self.urls_pending
        )
    }
}

/// Handle that stops a crawl from another thread
///
/// Holds no reference to the worker or connection pools, so it can live in
/// contexts (such as a signal handler task) that must not own the crawler.
#[derive(Clone)]
pub struct StopHandle {
    token: StopToken,
    frontier: Arc<Frontier>,
}

impl StopHandle {
    /// Requests the crawl to stop and wakes the dispatch loop
    ///
    /// Returns immediately. Work already handed to a worker runs to
    /// completion.
    pub fn stop(&self) {
        if self.token.cancel() {
            tracing::info!("Stop requested");
        }
        self.frontier.notify();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A concurrent crawler
///
/// `F` fetches pages, `S` is one storage connection. The crawler is built
/// with a fixed set of connections, which it pools across its workers.
pub struct Crawler<F, S> {
    frontier: Arc<Frontier>,
    workers: WorkerPool,
    connections: Arc<ConnectionPool<S>>,
    processor: Arc<PageProcessor<F, S>>,
    stop: StopToken,
    phase: Mutex<Phase>,
    stats: Arc<CrawlStats>,
    progress_interval: u64,
}

impl<F, S> Crawler<F, S>
where
    F: Fetcher + 'static,
    S: Storage + 'static,
{
    /// Creates a crawler and spawns its worker threads
    ///
    /// # Arguments
    ///
    /// * `config` - Worker count, acquire timeout, URL length cap and
    ///   progress interval
    /// * `fetcher` - Shared by every worker
    /// * `connections` - Storage connections to pool; at least one
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Crawler ready to [`start`](Self::start)
    /// * `Err(CrawlError)` - Invalid sizing or a worker thread failed to spawn
    pub fn new(config: &CrawlerConfig, fetcher: F, connections: Vec<S>) -> Result<Self, CrawlError> {
        if config.workers == 0 {
            return Err(ConfigError::Validation("workers must be at least 1".to_string()).into());
        }
        if connections.is_empty() {
            return Err(ConfigError::Validation(
                "at least one storage connection is required".to_string(),
            )
            .into());
        }

        let frontier = Arc::new(Frontier::with_max_url_length(config.max_url_length));
        let stats = Arc::new(CrawlStats::new());
        let connection_count = connections.len();
        let connections = Arc::new(ConnectionPool::new(
            connections,
            Some(config.acquire_timeout()),
        ));
        let processor = Arc::new(PageProcessor::new(
            fetcher,
            Arc::clone(&connections),
            Arc::clone(&frontier),
            Arc::clone(&stats),
        ));

        let workers = WorkerPool::new(config.workers as usize)?;
        let idle_frontier = Arc::clone(&frontier);
        workers.set_on_idle(Arc::new(move || idle_frontier.notify()));

        tracing::debug!(
            "Crawler created with {} workers and {} storage connections",
            config.workers,
            connection_count
        );

        Ok(Self {
            frontier,
            workers,
            connections,
            processor,
            stop: StopToken::new(),
            phase: Mutex::new(Phase::Idle),
            stats,
            progress_interval: config.progress_interval.max(1),
        })
    }

    /// Runs a crawl from `seed`, blocking until it stops
    ///
    /// The seed is normalized, marked seen, and handed straight to a worker.
    /// The crawl then continues until [`stop`](Self::stop) is called or the
    /// frontier is exhausted (queue empty and every worker idle). Before
    /// returning, the worker pool is shut down so that in-flight pages
    /// finish.
    ///
    /// # Errors
    ///
    /// * `CrawlError::Url` - The seed is not an absolute http(s) URL
    /// * `CrawlError::AlreadyStarted` - `start` was already called
    pub fn start(&self, seed: &str) -> Result<CrawlSummary, CrawlError> {
        let seed = PageUrl::parse(seed)?;
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Idle {
                return Err(CrawlError::AlreadyStarted);
            }
            *phase = Phase::Running;
        }

        let started = Instant::now();
        tracing::info!(
            "Starting crawl from {} with {} workers",
            seed,
            self.workers.size()
        );

        if !self.stop.is_cancelled() {
            self.frontier.mark_seen(seed.as_str());
            self.dispatch(vec![seed.as_str().to_string()]);
        }

        let stop_reason = self.run_dispatch_loop();

        *self.phase.lock() = Phase::Stopping;
        tracing::info!("Crawl stopping ({}), waiting for in-flight pages", stop_reason);
        self.workers.shutdown();
        *self.phase.lock() = Phase::Stopped;

        let summary = CrawlSummary {
            seed: seed.as_str().to_string(),
            stop_reason,
            elapsed: started.elapsed(),
            stats: self.stats.snapshot(),
            urls_seen: self.frontier.seen_count(),
            urls_pending: self.frontier.len(),
        };
        tracing::info!("Finished {}", summary);
        Ok(summary)
    }

    fn run_dispatch_loop(&self) -> StopReason {
        loop {
            let wake = self.frontier.wait_until(
                &self.stop,
                || self.workers.idle_count() > 0,
                || self.workers.is_drained(),
            );

            match wake {
                Wake::Stopped => return StopReason::Requested,
                Wake::Exhausted => {
                    tracing::info!("Frontier exhausted with all workers idle");
                    self.stop.cancel();
                    return StopReason::Exhausted;
                }
                Wake::Work => {
                    let idle = self.workers.idle_count();
                    let batch = self.frontier.pop_up_to(idle);
                    if !batch.is_empty() {
                        tracing::debug!(
                            "Dispatching {} URLs to {} idle workers ({} still queued)",
                            batch.len(),
                            idle,
                            self.frontier.len()
                        );
                        self.dispatch(batch);
                    }
                }
            }
        }
    }

    fn dispatch(&self, urls: Vec<String>) {
        let count = urls.len() as u64;
        for url in urls {
            let processor = Arc::clone(&self.processor);
            self.workers.submit(move || processor.process(&url));
        }

        let total = self.stats.record_dispatched(count);
        if (total - count) / self.progress_interval != total / self.progress_interval {
            tracing::info!(
                "Progress: {} URLs dispatched, {} queued, {} seen",
                total,
                self.frontier.len(),
                self.frontier.seen_count()
            );
        }
    }

    /// Requests the crawl to stop
    ///
    /// Returns immediately; [`start`](Self::start) returns once in-flight
    /// pages finish. Calling it before `start` makes `start` return right
    /// away.
    pub fn stop(&self) {
        self.stop_handle().stop();
        let mut phase = self.phase.lock();
        if *phase == Phase::Running {
            *phase = Phase::Stopping;
        }
    }

    /// A handle that can stop this crawl from elsewhere
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
            frontier: Arc::clone(&self.frontier),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Current values of the live crawl counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Number of storage connections in the pool
    pub fn connection_count(&self) -> usize {
        self.connections.size()
    }
}

impl<F, S> Drop for Crawler<F, S> {
    fn drop(&mut self) {
        self.stop.cancel();
        self.frontier.notify();
        self.workers.shutdown();
    }
}
