//! Background job pool
//!
//! Matching and indexing run on a fixed set of tokio workers fed by a bounded
//! queue. Submission never blocks: when the queue is full the job is rejected
//! with [`JobError::QueueFull`] and the caller decides what to do.
//!
//! Each accepted job gets a [`JobHandle`] that resolves once the job
//! finishes. Dropping the handle does not cancel the job.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

pub mod dispatcher;
pub mod progress;

pub use dispatcher::JobDispatcher;
pub use progress::{IngestProgress, IngestStage, ListProgress, MigrationProgressSnapshot, ProgressStore};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job queue is full ({capacity} pending jobs)")]
    QueueFull { capacity: usize },

    #[error("Job pool has shut down")]
    Closed,

    #[error("Job failed: {0}")]
    Failed(String),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Job result was lost before completion")]
    Cancelled,
}

/// What a job does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    MatchAndIndex { list_id: Uuid, rematch: bool },
    MatchAndIndexAll { rematch: bool },
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::MatchAndIndex { list_id, rematch } => {
                write!(f, "match_and_index(list={}, rematch={})", list_id, rematch)
            },
            JobKind::MatchAndIndexAll { rematch } => write!(f, "match_and_index_all(rematch={})", rematch),
        }
    }
}

/// Counters reported by a finished job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub lists_processed: u64,
    pub records_processed: u64,
    pub records_indexed: u64,
    pub records_failed: u64,
    pub distinct_matches: u64,
}

impl JobSummary {
    pub fn absorb(&mut self, other: &JobSummary) {
        self.lists_processed += other.lists_processed;
        self.records_processed += other.records_processed;
        self.records_indexed += other.records_indexed;
        self.records_failed += other.records_failed;
        self.distinct_matches += other.distinct_matches;
    }
}

pub type JobFuture = BoxFuture<'static, anyhow::Result<JobSummary>>;

struct QueuedJob {
    id: Uuid,
    kind: JobKind,
    task: JobFuture,
    reply: oneshot::Sender<Result<JobSummary, JobError>>,
}

/// Completion handle for a submitted job
#[derive(Debug)]
pub struct JobHandle {
    pub id: Uuid,
    pub kind: JobKind,
    result: oneshot::Receiver<Result<JobSummary, JobError>>,
}

impl JobHandle {
    /// Wait for the job to finish
    pub async fn wait(self) -> Result<JobSummary, JobError> {
        self.result.await.map_err(|_| JobError::Cancelled)?
    }
}

/// Fixed-size worker pool with a bounded queue
#[derive(Clone)]
pub struct JobPool {
    sender: mpsc::Sender<QueuedJob>,
    capacity: usize,
    active: Arc<AtomicUsize>,
}

impl JobPool {
    /// Spawn `workers` tokio tasks draining a queue of `capacity` jobs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel::<QueuedJob>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let active = Arc::new(AtomicUsize::new(0));

        for worker in 0..workers {
            let receiver = Arc::clone(&receiver);
            let active = Arc::clone(&active);
            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(job) = next else {
                        break;
                    };
                    active.fetch_add(1, Ordering::SeqCst);
                    run_job(worker, job).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }

        info!(workers, capacity, "Job pool started");

        Self {
            sender,
            capacity,
            active,
        }
    }

    /// Queue a job without waiting for room
    pub fn submit(&self, kind: JobKind, task: JobFuture) -> Result<JobHandle, JobError> {
        let (reply, result) = oneshot::channel();
        let id = Uuid::new_v4();
        let job = QueuedJob {
            id,
            kind,
            task,
            reply,
        };

        match self.sender.try_send(job) {
            Ok(()) => Ok(JobHandle { id, kind, result }),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%kind, capacity = self.capacity, "Job queue full, rejecting job");
                Err(JobError::QueueFull {
                    capacity: self.capacity,
                })
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(JobError::Closed),
        }
    }

    /// Jobs currently executing
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Jobs waiting for a worker
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }
}

async fn run_job(worker: usize, job: QueuedJob) {
    let QueuedJob {
        id,
        kind,
        task,
        reply,
    } = job;
    let span = tracing::info_span!("job", job_id = %id, %kind, worker);

    let outcome = async {
        info!("Job started");
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(summary)) => {
                info!(
                    records_processed = summary.records_processed,
                    records_indexed = summary.records_indexed,
                    records_failed = summary.records_failed,
                    "Job finished"
                );
                Ok(summary)
            },
            Ok(Err(e)) => {
                error!(error = %e, "Job failed");
                Err(JobError::Failed(format!("{:#}", e)))
            },
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %message, "Job panicked");
                Err(JobError::Panicked(message))
            },
        }
    }
    .instrument(span)
    .await;

    // receiver may have been dropped; the job still ran
    let _ = reply.send(outcome);
}
