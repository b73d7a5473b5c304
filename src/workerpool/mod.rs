//! Bounded worker pool for CPU-bound jobs (C5) — hashing, PDF rendering,
//! drift-score computation, and similar pure functions over serializable
//! input/output. A single `tokio::sync::mpsc` bounded channel is the
//! submission queue; `N` tasks contend only on its head (§5), each wrapped
//! in a supervising loop that respawns the task with exponential backoff if
//! it ever exits abnormally, counting restarts in [`PoolStats`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// A job is a pure function over a serializable input producing a
/// serializable output; it receives a [`CancellationToken`] and is expected
/// to poll it at safe points during long work.
pub type JobFn = Arc<dyn Fn(Value, CancellationToken) -> AppResult<Value> + Send + Sync>;

struct JobMessage {
    job: JobFn,
    input: Value,
    cancel: CancellationToken,
    respond_to: oneshot::Sender<AppResult<Value>>,
}

#[derive(Debug, Default)]
struct StatsInner {
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    restarts: AtomicU64,
}

/// Point-in-time snapshot of [`WorkerPool`] stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub restarts: u64,
}

/// A handle to an in-flight job, returned by [`WorkerPool::submit`]. Awaiting
/// it blocks until the job completes, is cancelled, or the caller's deadline
/// (passed to `submit`) elapses.
pub struct JobHandle {
    cancel: CancellationToken,
    result: oneshot::Receiver<AppResult<Value>>,
}

impl JobHandle {
    /// Signal cancellation; the job observes this at its next safe point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> AppResult<Value> {
        self.result
            .await
            .unwrap_or_else(|_| Err(AppError::internal("worker dropped without responding")))
    }
}

pub struct WorkerPool {
    sender: mpsc::Sender<JobMessage>,
    stats: Arc<StatsInner>,
    size: usize,
}

impl WorkerPool {
    /// Default size is `cpuCount - 1`, per §4.3.
    pub fn default_size() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1)
    }

    pub fn new(size: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(StatsInner::default());

        for id in 0..size {
            tokio::spawn(supervise_worker(id, receiver.clone(), stats.clone()));
        }

        Self { sender, stats, size }
    }

    pub fn worker_count(&self) -> usize {
        self.size
    }

    /// `submit(job, {timeout})`. Returns [`JobHandle`] immediately, or
    /// `queueFull` synchronously if the queue is at capacity (backpressure,
    /// §4.3). The caller drives the deadline itself by calling
    /// `tokio::time::timeout` around `handle.wait()`, or by calling
    /// [`Self::submit_with_deadline`] which does it for them.
    pub fn submit(&self, job: JobFn, input: Value) -> AppResult<JobHandle> {
        let cancel = CancellationToken::new();
        let (respond_to, result) = oneshot::channel();
        let message = JobMessage { job, input, cancel: cancel.clone(), respond_to };

        match self.sender.try_send(message) {
            Ok(()) => Ok(JobHandle { cancel, result }),
            Err(_) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Err(AppError::new(crate::error::ErrorKind::QueueFull, "worker pool queue is full"))
            }
        }
    }

    /// `submit` plus a deadline: behaves identically to cancellation if the
    /// deadline elapses first (§5).
    pub async fn submit_with_deadline(
        &self,
        job: JobFn,
        input: Value,
        deadline: Duration,
    ) -> AppResult<Value> {
        let handle = self.submit(job, input)?;
        let cancel_for_timeout = handle.cancel.clone();
        match tokio::time::timeout(deadline, handle.wait()).await {
            Ok(result) => result,
            Err(_) => {
                cancel_for_timeout.cancel();
                Err(AppError::new(crate::error::ErrorKind::Cancelled, "job deadline exceeded"))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            restarts: self.stats.restarts.load(Ordering::Relaxed),
        }
    }
}

/// Runs a worker loop, respawning it with exponential backoff if the task
/// ever exits abnormally (a panic inside `run_worker` is itself caught
/// around each job, so this only fires on truly unexpected exits, e.g. a
/// poisoned internal invariant).
async fn supervise_worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<JobMessage>>>,
    stats: Arc<StatsInner>,
) {
    let mut attempt = 0u32;
    loop {
        let outcome = AssertUnwindSafe(run_worker(id, receiver.clone(), stats.clone()))
            .catch_unwind()
            .await;
        match outcome {
            Ok(WorkerExit::ChannelClosed) => return,
            Ok(WorkerExit::Crashed) | Err(_) => {
                stats.restarts.fetch_add(1, Ordering::Relaxed);
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt.min(6)));
                attempt += 1;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

enum WorkerExit {
    ChannelClosed,
    Crashed,
}

async fn run_worker(
    _id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<JobMessage>>>,
    stats: Arc<StatsInner>,
) -> WorkerExit {
    loop {
        let message = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(message) = message else {
            return WorkerExit::ChannelClosed;
        };

        if message.cancel.is_cancelled() {
            let _ = message.respond_to.send(Err(AppError::new(
                crate::error::ErrorKind::Cancelled,
                "job cancelled before it started",
            )));
            continue;
        }

        let job = message.job.clone();
        let input = message.input.clone();
        let cancel = message.cancel.clone();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| job(input, cancel)));

        match outcome {
            Ok(Ok(value)) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
                let _ = message.respond_to.send(Ok(value));
            }
            Ok(Err(err)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                let _ = message.respond_to.send(Err(err));
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                let _ = message
                    .respond_to
                    .send(Err(AppError::internal("worker job panicked")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double() -> JobFn {
        Arc::new(|input, _cancel| {
            let n = input.as_i64().ok_or_else(|| AppError::validation("expected integer"))?;
            Ok(Value::from(n * 2))
        })
    }

    #[tokio::test]
    async fn submit_runs_job_and_returns_output() {
        let pool = WorkerPool::new(2, 8);
        let handle = pool.submit(double(), Value::from(21)).unwrap();
        assert_eq!(handle.wait().await.unwrap(), Value::from(42));
        assert_eq!(pool.stats().completed, 1);
    }

    #[tokio::test]
    async fn job_error_is_propagated_and_counted_as_failed() {
        let pool = WorkerPool::new(1, 8);
        let handle = pool.submit(double(), Value::from("not a number")).unwrap();
        assert!(handle.wait().await.is_err());
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn full_queue_is_rejected_synchronously() {
        let pool = WorkerPool::new(0, 1);
        let slow: JobFn = Arc::new(|_input, _cancel| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Value::Null)
        });
        let _first = pool.submit(slow.clone(), Value::Null).unwrap();
        let second = pool.submit(slow, Value::Null);
        assert!(matches!(second, Err(e) if e.kind() == crate::error::ErrorKind::QueueFull));
    }

    #[tokio::test]
    async fn deadline_behaves_like_cancellation() {
        let pool = WorkerPool::new(1, 8);
        let slow: JobFn = Arc::new(|_input, cancel| {
            for _ in 0..50 {
                if cancel.is_cancelled() {
                    return Err(AppError::new(crate::error::ErrorKind::Cancelled, "observed cancel"));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(Value::Null)
        });
        let result = pool
            .submit_with_deadline(slow, Value::Null, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(e) if e.kind() == crate::error::ErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn panic_in_job_is_caught_and_reported_as_internal_error() {
        let pool = WorkerPool::new(1, 8);
        let boom: JobFn = Arc::new(|_input, _cancel| panic!("boom"));
        let handle = pool.submit(boom, Value::Null).unwrap();
        let result = handle.wait().await;
        assert!(result.is_err());
    }
}
