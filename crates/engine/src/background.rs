//! Bounded worker pool for asynchronous prefetches
//!
//! Prefetches are fire-and-forget from the request thread's viewpoint:
//! submission either enqueues the task or reports backpressure, and the
//! task itself is observable only through the buffer's refresh-flag state
//! machine. Tasks run to completion; there is no external cancellation,
//! the refresh-flag timeout is the sole recovery for a silently-dead task.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

/// Error returned when the prefetch queue is full or shut down.
#[derive(Debug)]
pub struct BackpressureError;

impl std::fmt::Display for BackpressureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "prefetch queue is full")
    }
}

impl std::error::Error for BackpressureError {}

/// Pool metrics snapshot.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Tasks currently executing.
    pub active_tasks: usize,
    /// Tasks completed since pool creation (panicked tasks included).
    pub tasks_completed: u64,
    /// Submissions rejected for backpressure.
    pub tasks_rejected: u64,
    /// Worker thread count.
    pub worker_count: usize,
}

type Task = Box<dyn FnOnce() + Send>;

struct PoolInner {
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    max_queue_depth: usize,
    tasks_completed: AtomicU64,
    tasks_rejected: AtomicU64,
}

/// Fixed pool of worker threads draining a bounded FIFO queue.
pub struct PrefetchPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl std::fmt::Debug for PrefetchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchPool")
            .field("workers", &self.num_threads)
            .finish()
    }
}

impl PrefetchPool {
    /// Create a pool. Workers are named `stride-prefetch-0`, `-1`, etc.
    pub fn new(num_threads: usize, max_queue_depth: usize) -> Self {
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            max_queue_depth,
            tasks_completed: AtomicU64::new(0),
            tasks_rejected: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner_clone = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("stride-prefetch-{}", i))
                .spawn(move || worker_loop(&inner_clone))
                .expect("failed to spawn prefetch worker thread");
            workers.push(handle);
        }

        Self {
            inner,
            workers: Mutex::new(workers),
            num_threads,
        }
    }

    /// Submit a task.
    ///
    /// Returns `Err(BackpressureError)` when the queue is at capacity or
    /// the pool has been shut down; the caller clears the refresh flag so
    /// a later request retries.
    pub fn submit(&self, work: impl FnOnce() + Send + 'static) -> Result<(), BackpressureError> {
        if self.inner.shutdown.load(Ordering::Acquire)
            || self.inner.queue_depth.load(Ordering::Acquire) >= self.inner.max_queue_depth
        {
            self.inner.tasks_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(BackpressureError);
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Box::new(work));
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until all queued and in-flight tasks have completed.
    ///
    /// Workers remain running afterwards; this does not signal shutdown.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_tasks.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to exit and join them. Remaining queued tasks are
    /// drained first.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Lock the queue before notifying to prevent a lost wakeup: a
        // worker between its shutdown check and condvar wait holds this
        // lock, so acquiring it guarantees the worker either sees the
        // notify or re-checks the flag.
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Metrics snapshot.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_tasks: self.inner.active_tasks.load(Ordering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            tasks_rejected: self.inner.tasks_rejected.load(Ordering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

/// Decrements `active_tasks` and notifies drain waiters on drop, so the
/// bookkeeping survives a panicking task; otherwise `drain()` would hang
/// on the permanently-inflated counter.
struct ActiveTaskGuard<'a> {
    inner: &'a PoolInner,
}

impl Drop for ActiveTaskGuard<'_> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::Release);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };

        // Execute outside the lock. catch_unwind keeps a panicking prefetch
        // from killing the worker; the guard handles bookkeeping either way.
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            error!(
                "prefetch task panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}
