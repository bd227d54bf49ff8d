//! Crawl frontier: pending URLs plus the set of every URL ever admitted
//!
//! The queue, the seen-set and the "work available" condition variable share
//! one lock, so deciding that a URL is new, recording it as seen and queueing
//! it happen in a single critical section.

use crate::config::DEFAULT_MAX_URL_LENGTH;
use crate::crawler::StopToken;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};

/// Why a frontier wait returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// URLs are queued (and, for [`Frontier::wait_until`], dispatchable)
    Work,
    /// The stop token was cancelled
    Stopped,
    /// The queue is empty and the drain check reported no work in flight
    Exhausted,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<String>,
    seen: HashSet<String>,
}

/// Thread-safe FIFO of URLs awaiting a visit, with deduplication
#[derive(Debug)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    work_available: Condvar,
    max_url_length: usize,
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontier {
    /// Creates an empty frontier with the default URL length cap
    pub fn new() -> Self {
        Self::with_max_url_length(DEFAULT_MAX_URL_LENGTH)
    }

    /// Creates an empty frontier refusing URLs longer than `max_url_length`
    /// characters
    pub fn with_max_url_length(max_url_length: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            work_available: Condvar::new(),
            max_url_length,
        }
    }

    /// Longest URL (in characters) this frontier admits
    pub fn max_url_length(&self) -> usize {
        self.max_url_length
    }

    /// Returns true if `url` is short enough to be admitted
    pub fn fits(&self, url: &str) -> bool {
        url.chars().count() <= self.max_url_length
    }

    /// Adds a URL to the back of the queue unless it has been seen before
    ///
    /// Wakes the dispatch loop when the URL is queued. Oversized URLs are
    /// refused without touching the queue or the seen-set.
    ///
    /// # Returns
    ///
    /// `true` if the URL was new and has been queued
    pub fn push(&self, url: &str) -> bool {
        self.push_with(url, |_| {})
    }

    /// Like [`push`](Self::push), running `on_admit` for a new URL inside the
    /// critical section, before the URL becomes visible in the queue
    ///
    /// `on_admit` runs with the frontier locked; it must not call back into
    /// the frontier.
    pub fn push_with<F>(&self, url: &str, on_admit: F) -> bool
    where
        F: FnOnce(&str),
    {
        if !self.fits(url) {
            tracing::trace!(
                "Refusing URL longer than {} characters",
                self.max_url_length
            );
            return false;
        }

        let mut state = self.state.lock();
        if state.seen.contains(url) {
            return false;
        }

        on_admit(url);
        state.seen.insert(url.to_string());
        state.queue.push_back(url.to_string());
        drop(state);

        self.work_available.notify_all();
        true
    }

    /// Records a URL as seen without queueing it
    ///
    /// Used for URLs that are dispatched directly, such as the crawl seed.
    ///
    /// # Returns
    ///
    /// `true` if the URL had not been seen before
    pub fn mark_seen(&self, url: &str) -> bool {
        if !self.fits(url) {
            return false;
        }
        self.state.lock().seen.insert(url.to_string())
    }

    /// Removes and returns up to `n` URLs from the front of the queue
    ///
    /// Never blocks; returns fewer than `n` (possibly none) when the queue is
    /// shorter.
    pub fn pop_up_to(&self, n: usize) -> Vec<String> {
        let mut state = self.state.lock();
        let count = n.min(state.queue.len());
        state.queue.drain(..count).collect()
    }

    /// Blocks until the queue is non-empty or `stop` is cancelled
    pub fn wait_for_work(&self, stop: &StopToken) -> Wake {
        self.wait_until(stop, || true, || false)
    }

    /// Blocks until there is dispatchable work, the crawl is drained, or
    /// `stop` is cancelled
    ///
    /// Both predicates are evaluated with the frontier locked, after every
    /// wake-up:
    /// - returns [`Wake::Work`] when the queue is non-empty and
    ///   `can_dispatch()` holds
    /// - returns [`Wake::Exhausted`] when the queue is empty and
    ///   `is_drained()` holds
    ///
    /// Whatever changes the state behind either predicate must call
    /// [`notify`](Self::notify) afterwards.
    pub fn wait_until<D, E>(&self, stop: &StopToken, mut can_dispatch: D, mut is_drained: E) -> Wake
    where
        D: FnMut() -> bool,
        E: FnMut() -> bool,
    {
        let mut state = self.state.lock();
        loop {
            if stop.is_cancelled() {
                return Wake::Stopped;
            }

            if state.queue.is_empty() {
                if is_drained() {
                    return Wake::Exhausted;
                }
            } else if can_dispatch() {
                return Wake::Work;
            }

            self.work_available.wait(&mut state);
        }
    }

    /// Wakes every waiter so it re-evaluates its predicates
    pub fn notify(&self) {
        let _state = self.state.lock();
        self.work_available.notify_all();
    }

    /// Number of queued URLs
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns true if no URLs are queued
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Number of URLs ever admitted
    pub fn seen_count(&self) -> usize {
        self.state.lock().seen.len()
    }

    /// Returns true if `url` has been admitted at some point
    pub fn has_seen(&self, url: &str) -> bool {
        self.state.lock().seen.contains(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_and_pop_fifo() {
        let frontier = Frontier::new();
        assert!(frontier.push("http://a.test/1"));
        assert!(frontier.push("http://a.test/2"));
        assert!(frontier.push("http://a.test/3"));

        assert_eq!(
            frontier.pop_up_to(2),
            vec!["http://a.test/1".to_string(), "http://a.test/2".to_string()]
        );
        assert_eq!(frontier.pop_up_to(5), vec!["http://a.test/3".to_string()]);
        assert!(frontier.pop_up_to(5).is_empty());
    }

    #[test]
    fn test_duplicate_push_is_noop() {
        let frontier = Frontier::new();
        assert!(frontier.push("http://a.test/"));
        assert!(!frontier.push("http://a.test/"));
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.seen_count(), 1);
    }

    #[test]
    fn test_seen_survives_pop() {
        let frontier = Frontier::new();
        frontier.push("http://a.test/");
        frontier.pop_up_to(1);

        assert!(frontier.is_empty());
        assert!(frontier.has_seen("http://a.test/"));
        assert!(!frontier.push("http://a.test/"));
    }

    #[test]
    fn test_oversized_url_is_refused() {
        let frontier = Frontier::new();
        let long_url = format!("http://a.test/{}", "x".repeat(600));

        assert!(!frontier.push(&long_url));
        assert_eq!(frontier.len(), 0);
        assert_eq!(frontier.seen_count(), 0);
        assert!(!frontier.has_seen(&long_url));
    }

    #[test]
    fn test_length_cap_boundary() {
        let frontier = Frontier::with_max_url_length(20);
        let exact = format!("http://a.test/{}", "x".repeat(6));
        assert_eq!(exact.len(), 20);

        assert!(frontier.push(&exact));
        assert!(!frontier.push(&format!("{}y", exact)));
    }

    #[test]
    fn test_push_with_runs_callback_only_for_new_urls() {
        let frontier = Frontier::new();
        let mut admitted = Vec::new();

        frontier.push_with("http://a.test/", |url| admitted.push(url.to_string()));
        frontier.push_with("http://a.test/", |url| admitted.push(url.to_string()));

        assert_eq!(admitted, vec!["http://a.test/".to_string()]);
    }

    #[test]
    fn test_mark_seen_does_not_queue() {
        let frontier = Frontier::new();
        assert!(frontier.mark_seen("http://seed.test/"));
        assert!(!frontier.mark_seen("http://seed.test/"));
        assert!(frontier.is_empty());
        assert!(!frontier.push("http://seed.test/"));
    }

    #[test]
    fn test_concurrent_pushes_deduplicate() {
        let frontier = Arc::new(Frontier::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let frontier = Arc::clone(&frontier);
                thread::spawn(move || {
                    for i in 0..100 {
                        frontier.push(&format!("http://a.test/{}", i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(frontier.len(), 100);
        assert_eq!(frontier.seen_count(), 100);

        let mut popped = frontier.pop_up_to(1000);
        popped.sort();
        popped.dedup();
        assert_eq!(popped.len(), 100);
    }

    #[test]
    fn test_single_producer_order_preserved_under_contention() {
        let frontier = Arc::new(Frontier::new());

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|host| {
                let frontier = Arc::clone(&frontier);
                thread::spawn(move || {
                    for i in 0..50 {
                        frontier.push(&format!("http://{}.test/{}", host, i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let popped = frontier.pop_up_to(100);
        for host in ["a", "b"] {
            let prefix = format!("http://{}.test/", host);
            let order: Vec<usize> = popped
                .iter()
                .filter_map(|url| url.strip_prefix(&prefix))
                .map(|n| n.parse().unwrap())
                .collect();
            assert_eq!(order, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_wait_for_work_returns_when_pushed() {
        let frontier = Arc::new(Frontier::new());
        let stop = StopToken::new();

        let waiter = {
            let frontier = Arc::clone(&frontier);
            let stop = stop.clone();
            thread::spawn(move || frontier.wait_for_work(&stop))
        };

        thread::sleep(Duration::from_millis(50));
        frontier.push("http://a.test/");

        assert_eq!(waiter.join().unwrap(), Wake::Work);
    }

    #[test]
    fn test_wait_for_work_returns_when_stopped() {
        let frontier = Arc::new(Frontier::new());
        let stop = StopToken::new();

        let waiter = {
            let frontier = Arc::clone(&frontier);
            let stop = stop.clone();
            thread::spawn(move || frontier.wait_for_work(&stop))
        };

        thread::sleep(Duration::from_millis(50));
        stop.cancel();
        frontier.notify();

        assert_eq!(waiter.join().unwrap(), Wake::Stopped);
    }

    #[test]
    fn test_wait_for_work_immediate_when_queued() {
        let frontier = Frontier::new();
        frontier.push("http://a.test/");
        assert_eq!(frontier.wait_for_work(&StopToken::new()), Wake::Work);
    }

    #[test]
    fn test_stop_takes_priority_over_work() {
        let frontier = Frontier::new();
        frontier.push("http://a.test/");
        let stop = StopToken::new();
        stop.cancel();
        assert_eq!(frontier.wait_for_work(&stop), Wake::Stopped);
    }

    #[test]
    fn test_wait_until_reports_exhaustion() {
        let frontier = Frontier::new();
        let wake = frontier.wait_until(&StopToken::new(), || true, || true);
        assert_eq!(wake, Wake::Exhausted);
    }

    #[test]
    fn test_wait_until_holds_work_until_dispatchable() {
        let frontier = Arc::new(Frontier::new());
        frontier.push("http://a.test/");
        let ready = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let waiter = {
            let frontier = Arc::clone(&frontier);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                frontier.wait_until(
                    &StopToken::new(),
                    || ready.load(std::sync::atomic::Ordering::SeqCst),
                    || false,
                )
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        ready.store(true, std::sync::atomic::Ordering::SeqCst);
        frontier.notify();

        assert_eq!(waiter.join().unwrap(), Wake::Work);
    }
}
