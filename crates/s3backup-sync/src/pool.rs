//! Bounded worker pool with fail-fast cancellation
//!
//! [`WorkerPool::run`] spawns a fixed number of workers that pull tasks from
//! a shared queue, each finishing one task before taking the next. All
//! workers share a child of the caller's [`CancellationToken`]:
//!
//! - the first failing worker records its error and cancels the child token,
//!   so siblings stop at their next cancellation check and queued tasks are
//!   never started;
//! - cancelling the caller's token (deadline, interrupt) has the same effect,
//!   and a run that leaves tasks unstarted reports `SyncError::Cancelled`;
//! - `run` returns only after every spawned worker has been joined.
//!
//! The same pool serves both fan-outs of the engine: files of a directory
//! and parts of one large file.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{SyncError, SyncResult};

/// Outcome of one [`WorkerPool::run`] call
#[derive(Debug)]
pub struct PoolReport<O> {
    /// Outputs of tasks that succeeded, in completion order
    pub outputs: Vec<O>,
    /// Number of tasks submitted
    pub total: usize,
    /// Number of tasks a worker picked up
    pub started: usize,
    /// Number of started tasks that returned an error
    pub failed: usize,
    /// The error that triggered cancellation, if any
    pub first_error: Option<SyncError>,
}

impl<O> PoolReport<O> {
    /// Tasks that were never started because the pool was cancelled
    pub fn abandoned(&self) -> usize {
        self.total - self.started
    }

    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }

    /// The outputs, or the first error if any task failed
    pub fn into_result(self) -> SyncResult<Vec<O>> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.outputs),
        }
    }
}

/// Fixed-width pool of concurrent workers
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    width: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `width` tasks at once (at least 1)
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Runs `worker` over every task with at most `width` in flight
    ///
    /// The worker receives the pool's cancellation token and is expected to
    /// check it before starting I/O. See the module docs for the
    /// cancellation and join guarantees.
    pub async fn run<T, O, F, Fut>(
        &self,
        tasks: Vec<T>,
        parent: &CancellationToken,
        worker: F,
    ) -> PoolReport<O>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<O>> + Send + 'static,
    {
        let total = tasks.len();
        let cancel = parent.child_token();
        let queue = Arc::new(Mutex::new(tasks.into_iter()));
        let worker = Arc::new(worker);
        let started = Arc::new(AtomicUsize::new(0));
        let first_error: Arc<Mutex<Option<SyncError>>> = Arc::new(Mutex::new(None));

        let mut set = JoinSet::new();
        for worker_id in 0..self.width.min(total) {
            let queue = Arc::clone(&queue);
            let worker = Arc::clone(&worker);
            let started = Arc::clone(&started);
            let first_error = Arc::clone(&first_error);
            let cancel = cancel.clone();

            set.spawn(async move {
                let mut outputs = Vec::new();
                let mut failed = 0;

                loop {
                    if cancel.is_cancelled() {
                        debug!(worker_id, "pool cancelled, worker stopping");
                        break;
                    }
                    let Some(task) = queue.lock().await.next() else {
                        break;
                    };
                    started.fetch_add(1, Ordering::Relaxed);

                    match worker(task, cancel.clone()).await {
                        Ok(output) => outputs.push(output),
                        Err(err) => {
                            failed += 1;
                            let mut slot = first_error.lock().await;
                            if slot.is_none() {
                                if !err.is_cancelled() {
                                    warn!(worker_id, error = %err, "task failed, cancelling pool");
                                }
                                *slot = Some(err);
                            } else {
                                debug!(worker_id, error = %err, "task failed after cancellation");
                            }
                            drop(slot);
                            cancel.cancel();
                            break;
                        }
                    }
                }

                (outputs, failed)
            });
        }

        let mut outputs = Vec::with_capacity(total);
        let mut failed = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((worker_outputs, worker_failed)) => {
                    outputs.extend(worker_outputs);
                    failed += worker_failed;
                }
                Err(join_err) => {
                    failed += 1;
                    cancel.cancel();
                    let mut slot = first_error.lock().await;
                    if slot.is_none() {
                        *slot = Some(SyncError::Worker(join_err.to_string()));
                    }
                }
            }
        }

        let started = started.load(Ordering::Relaxed);
        let mut first_error = first_error.lock().await.take();
        if first_error.is_none() && started < total {
            // Only the caller's token can strand tasks without an error
            first_error = Some(SyncError::Cancelled);
        }
        PoolReport {
            outputs,
            total,
            started,
            failed,
            first_error,
        }
    }
}
