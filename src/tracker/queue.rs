//! Single worker FIFO queue serializing configuration writes and dispatch.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Task queue is closed")]
    Closed,
    #[error("Task was dropped before completing")]
    Dropped,
}

struct Job {
    label: &'static str,
    task: BoxFuture<'static, ()>,
}

/// Result of a submitted job.
pub struct JobHandle<T> {
    inner: HandleInner<T>,
}

enum HandleInner<T> {
    Pending(oneshot::Receiver<T>),
    Ready(T),
}

impl<T> JobHandle<T> {
    /// Handle that resolves immediately.
    pub fn ready(value: T) -> Self {
        Self {
            inner: HandleInner::Ready(value),
        }
    }

    pub async fn wait(self) -> Result<T, QueueError> {
        match self.inner {
            HandleInner::Ready(value) => Ok(value),
            HandleInner::Pending(rx) => rx.await.map_err(|_| QueueError::Dropped),
        }
    }
}

/// Jobs run one at a time in submission order. A panicking job is logged
/// and the worker moves on.
pub struct TrackerQueue {
    tx: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl TrackerQueue {
    /// Spawns the worker; must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                debug!("Running queued task: {}", job.label);
                if AssertUnwindSafe(job.task).catch_unwind().await.is_err() {
                    error!("Queued task {} panicked", job.label);
                }
            }
            debug!("Task queue worker stopped");
        });
        Self { tx, worker }
    }

    pub fn submit<T, F>(&self, label: &'static str, task: F) -> Result<JobHandle<T>, QueueError>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job = Job {
            label,
            task: async move {
                let _ = result_tx.send(task.await);
            }
            .boxed(),
        };
        self.tx.send(job).map_err(|_| QueueError::Closed)?;
        Ok(JobHandle {
            inner: HandleInner::Pending(result_rx),
        })
    }

    /// Resolves once every job submitted before the call has run.
    pub async fn wait_idle(&self) -> Result<(), QueueError> {
        self.submit("barrier", async {})?.wait().await
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}

impl Drop for TrackerQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
