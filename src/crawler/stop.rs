//! Crawl cancellation token

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag for one crawl session
///
/// The flag goes from running to stopped exactly once and is never reset.
/// Clones observe the same flag. Cancelling only flips the flag; whoever owns
/// a condition variable that waits on it is responsible for waking waiters.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Returns true if this call performed the transition.
    pub fn cancel(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
