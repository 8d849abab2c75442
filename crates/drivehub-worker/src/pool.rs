//! Bounded worker pool with caller-runs backpressure.
//!
//! Submission order follows the classic thread-pool policy: start a worker
//! while fewer than `core_size` are live, otherwise enqueue, otherwise start
//! a worker while fewer than `max_size` are live, otherwise run the job in
//! the submitting task. Work is never rejected while the pool is open.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use drivehub_core::config::WorkerConfig;

/// A unit of work accepted by the pool.
pub type Job = BoxFuture<'static, ()>;

/// Errors returned by [`WorkerPool::submit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool no longer accepts work.
    #[error("Worker pool is shut down")]
    ShutDown,
}

/// Where a submitted job ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Handed to a newly started worker.
    Worker,
    /// Placed on the pending queue.
    Queued,
    /// Executed inline by the submitter because the pool was saturated.
    CallerRan,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers currently alive.
    pub live_workers: usize,
    /// Jobs waiting in the queue.
    pub queued: usize,
    /// Jobs finished by workers or inline.
    pub completed: u64,
    /// Jobs executed inline by a submitter.
    pub caller_ran: u64,
}

/// Process-wide pool running jobs on tokio tasks.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    core_size: usize,
    max_size: usize,
    keep_alive: Duration,
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    receiver: Mutex<mpsc::Receiver<Job>>,
    live: AtomicUsize,
    queued: AtomicUsize,
    completed: AtomicU64,
    caller_ran: AtomicU64,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("core_size", &self.inner.core_size)
            .field("max_size", &self.inner.max_size)
            .field("stats", &self.stats())
            .finish()
    }
}

enum NextJob {
    Job(Job),
    Idle,
    Closed,
}

impl WorkerPool {
    /// Create a pool from the worker configuration. No workers start until
    /// the first submission.
    pub fn new(config: &WorkerConfig) -> Self {
        let core_size = config.core_size.max(1);
        let max_size = config.max_size.max(core_size);
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));

        info!(
            core_size,
            max_size,
            queue_depth = config.queue_depth,
            keep_alive_secs = config.keep_alive_seconds,
            "Worker pool created"
        );

        Self {
            inner: Arc::new(PoolInner {
                core_size,
                max_size,
                keep_alive: config.keep_alive(),
                sender: RwLock::new(Some(sender)),
                receiver: Mutex::new(receiver),
                live: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                caller_ran: AtomicU64::new(0),
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Submit a job.
    ///
    /// When the queue is full and `max_size` workers are busy the job runs
    /// to completion inside this call before it returns.
    pub async fn submit<F>(&self, job: F) -> Result<Submission, PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self
            .inner
            .sender
            .read()
            .await
            .clone()
            .ok_or(PoolError::ShutDown)?;
        let job: Job = Box::pin(job);

        if self.inner.try_reserve_worker(self.inner.core_size) {
            self.spawn_worker(job);
            return Ok(Submission::Worker);
        }

        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        let job = match sender.try_send(job) {
            Ok(()) => return Ok(Submission::Queued),
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.inner.queued.fetch_sub(1, Ordering::SeqCst);
                job
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.inner.queued.fetch_sub(1, Ordering::SeqCst);
                return Err(PoolError::ShutDown);
            }
        };

        if self.inner.try_reserve_worker(self.inner.max_size) {
            self.spawn_worker(job);
            return Ok(Submission::Worker);
        }

        trace!("Worker pool saturated, running job in caller");
        self.inner.caller_ran.fetch_add(1, Ordering::Relaxed);
        self.inner.run_job(job).await;
        Ok(Submission::CallerRan)
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live_workers: self.inner.live.load(Ordering::SeqCst),
            queued: self.inner.queued.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::Relaxed),
            caller_ran: self.inner.caller_ran.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work and drain.
    ///
    /// Queued jobs keep running for up to `grace`; after that, outstanding
    /// work is cancelled. Returns `true` when everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.sender.write().await.take();
        self.inner.tracker.close();
        info!(stats = ?self.stats(), "Worker pool draining");

        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok()
        {
            info!("Worker pool drained");
            return true;
        }

        warn!(
            grace_secs = grace.as_secs(),
            stats = ?self.stats(),
            "Worker pool did not drain in time, cancelling outstanding work"
        );
        self.inner.cancel.cancel();
        self.inner.tracker.wait().await;
        false
    }

    fn spawn_worker(&self, first: Job) {
        let inner = Arc::clone(&self.inner);
        debug!(live = inner.live.load(Ordering::SeqCst), "Starting pool worker");
        self.inner.tracker.spawn(worker_loop(inner, first));
    }
}

impl PoolInner {
    fn try_reserve_worker(&self, limit: usize) -> bool {
        let mut live = self.live.load(Ordering::SeqCst);
        while live < limit {
            match self
                .live
                .compare_exchange(live, live + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(current) => live = current,
            }
        }
        false
    }

    /// Give up an idle worker slot unless that would go below `core_size`.
    fn try_retire(&self) -> bool {
        let mut live = self.live.load(Ordering::SeqCst);
        while live > self.core_size {
            match self
                .live
                .compare_exchange(live, live - 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(current) => live = current,
            }
        }
        false
    }

    async fn next_job(&self) -> NextJob {
        let receive = async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => NextJob::Closed,
            received = tokio::time::timeout(self.keep_alive, receive) => match received {
                Ok(Some(job)) => {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    NextJob::Job(job)
                }
                Ok(None) => NextJob::Closed,
                Err(_) => NextJob::Idle,
            },
        }
    }

    async fn run_job(&self, job: Job) {
        if let Err(payload) = AssertUnwindSafe(job).catch_unwind().await {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(panic = %message, "Pool job panicked");
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

async fn worker_loop(inner: Arc<PoolInner>, first: Job) {
    let mut next = Some(first);
    loop {
        let job = match next.take() {
            Some(job) => job,
            None => match inner.next_job().await {
                NextJob::Job(job) => job,
                NextJob::Idle => {
                    if inner.try_retire() {
                        trace!("Idle pool worker retired");
                        return;
                    }
                    continue;
                }
                NextJob::Closed => break,
            },
        };

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            _ = inner.run_job(job) => {}
        }
    }
    inner.live.fetch_sub(1, Ordering::SeqCst);
}
