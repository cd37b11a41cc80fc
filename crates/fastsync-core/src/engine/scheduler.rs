//! Scheduler - bounded worker pool for download tasks
//!
//! The producer pushes tasks into a bounded queue; a fixed number of workers
//! drain it. How many tasks may transfer at the same time is bounded
//! separately by the download slots of the [`TaskContext`].

use crate::engine::download_task::{DownloadTask, TaskContext};
use crate::error::SyncError;
use fastsync_types::TaskOutcome;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Final result of one executed task
#[derive(Debug)]
pub struct TaskReport {
    pub path: String,
    pub result: Result<TaskOutcome, SyncError>,
}

/// Cloneable handle used by producers to enqueue tasks
#[derive(Clone, Debug)]
pub struct Submitter {
    tx: mpsc::Sender<DownloadTask>,
}

impl Submitter {
    /// Enqueue a task, waiting while the queue is full
    pub async fn submit(&self, task: DownloadTask) -> Result<(), SyncError> {
        self.tx.send(task).await.map_err(|_| SyncError::QueueClosed)
    }

    /// Enqueue a task without waiting
    pub fn try_submit(&self, task: DownloadTask) -> Result<(), SyncError> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SyncError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(SyncError::QueueClosed),
        }
    }
}

/// Fixed-size pool of workers draining a shared task queue
pub struct Scheduler {
    submitter: Submitter,
    workers: Vec<JoinHandle<Vec<TaskReport>>>,
    active: Arc<AtomicUsize>,
}

impl Scheduler {
    /// Spawn `worker_count` workers on the current runtime
    pub fn new(worker_count: usize, queue_capacity: usize, ctx: TaskContext) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let queue = Arc::new(Mutex::new(rx));
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    queue.clone(),
                    ctx.clone(),
                    active.clone(),
                ))
            })
            .collect();

        Self {
            submitter: Submitter { tx },
            workers,
            active,
        }
    }

    /// A handle for a producer running on its own task
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    pub async fn submit(&self, task: DownloadTask) -> Result<(), SyncError> {
        self.submitter.submit(task).await
    }

    pub fn try_submit(&self, task: DownloadTask) -> Result<(), SyncError> {
        self.submitter.try_submit(task)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers currently executing a task
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active_workers() > 0
    }

    /// Wait until the queue is closed and drained.
    ///
    /// The queue closes once every [`Submitter`] handed out has been dropped,
    /// so this only resolves after the producer has finished and every
    /// worker has run out of tasks.
    pub async fn join(self) -> Vec<TaskReport> {
        let Scheduler {
            submitter, workers, ..
        } = self;
        drop(submitter);

        let mut reports = Vec::new();
        for handle in workers {
            match handle.await {
                Ok(worker_reports) => reports.extend(worker_reports),
                Err(e) => error!("Worker terminated abnormally: {}", e),
            }
        }
        reports
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<DownloadTask>>>,
    ctx: TaskContext,
    active: Arc<AtomicUsize>,
) -> Vec<TaskReport> {
    let mut reports = Vec::new();

    loop {
        let next = queue.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        active.fetch_add(1, Ordering::AcqRel);
        let path = task.entry().path.clone();
        debug!("Worker {} picked up {}", worker_id, path);

        let result = task.run(&ctx).await;
        if let Err(e) = &result {
            match e {
                SyncError::Cancelled => warn!("{} cancelled", path),
                e => error!("{} failed ({}): {}", path, e.kind(), e),
            }
        }

        active.fetch_sub(1, Ordering::AcqRel);
        reports.push(TaskReport { path, result });
    }

    debug!("Worker {} finished, queue drained", worker_id);
    reports
}
