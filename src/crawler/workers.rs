//! Fixed-size pool of worker threads
//!
//! Workers take boxed tasks from a shared queue. The queue and the idle
//! counter sit behind one lock: a worker stops counting as idle in the same
//! critical section in which it dequeues a task.

use crate::CrawlError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Callback run by a worker each time it finishes a task
pub type IdleHook = Arc<dyn Fn() + Send + Sync>;

struct PoolState {
    tasks: VecDeque<Task>,
    idle: usize,
    stopped: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    task_ready: Condvar,
    size: usize,
    on_idle: Mutex<Option<IdleHook>>,
}

/// A fixed set of worker threads executing submitted tasks
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `size` worker threads
    pub fn new(size: usize) -> Result<Self, CrawlError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                tasks: VecDeque::new(),
                idle: size,
                stopped: false,
            }),
            task_ready: Condvar::new(),
            size,
            on_idle: Mutex::new(None),
        });

        let pool = Self {
            shared,
            handles: Mutex::new(Vec::with_capacity(size)),
        };

        for index in 0..size {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("crawl-worker-{}", index))
                .spawn(move || worker_loop(&shared))
                .map_err(CrawlError::Worker)?;
            pool.handles.lock().push(handle);
        }

        tracing::debug!("Started {} worker threads", size);
        Ok(pool)
    }

    /// Installs a callback run by a worker after every task it finishes
    ///
    /// The callback runs outside the pool lock and replaces any previous one.
    pub fn set_on_idle(&self, hook: IdleHook) {
        *self.shared.on_idle.lock() = Some(hook);
    }

    /// Queues a task for execution by the next free worker
    ///
    /// Never blocks. After shutdown the task is dropped without running.
    ///
    /// # Returns
    ///
    /// `true` if the task was queued
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.stopped {
            tracing::debug!("Worker pool stopped, dropping submitted task");
            return false;
        }
        state.tasks.push_back(Box::new(task));
        drop(state);

        self.shared.task_ready.notify_one();
        true
    }

    /// Number of workers free to take a new task
    ///
    /// Tasks already queued but not yet picked up count against the idle
    /// workers that will run them, so submitting this many tasks never
    /// oversubscribes the pool. The value is a snapshot and may be stale by
    /// the time it is used.
    pub fn idle_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.idle.saturating_sub(state.tasks.len())
    }

    /// Returns true when no task is queued or running
    pub fn is_drained(&self) -> bool {
        let state = self.shared.state.lock();
        state.tasks.is_empty() && state.idle == self.shared.size
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Stops the pool and joins every worker
    ///
    /// Idle workers wake up and exit; running tasks are allowed to finish.
    /// Queued tasks that no worker has started are discarded. Calling this
    /// more than once is harmless.
    pub fn shutdown(&self) {
        let discarded = {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            std::mem::take(&mut state.tasks)
        };
        self.shared.task_ready.notify_all();

        if !discarded.is_empty() {
            tracing::debug!("Discarding {} queued tasks on shutdown", discarded.len());
        }
        drop(discarded);

        let handles = std::mem::take(&mut *self.handles.lock());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if state.stopped {
                    return;
                }
                if let Some(task) = state.tasks.pop_front() {
                    state.idle -= 1;
                    break task;
                }
                shared.task_ready.wait(&mut state);
            }
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Task panicked: {}", message);
        }

        shared.state.lock().idle += 1;

        let on_idle = shared.on_idle.lock().clone();
        if let Some(on_idle) = on_idle {
            on_idle();
        }
    }
}
