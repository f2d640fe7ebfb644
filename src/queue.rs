//! Shared job queue.
//!
//! Channel and AI jobs share one bounded queue; workers claim jobs and
//! dispatch them to the matching invoker by kind. The queue is behind a
//! trait so the in-memory backend can be swapped for a table-backed one
//! without touching the orchestrator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::error::QueueError;

/// Which invoker a job is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Channel,
    Ai,
}

/// A reference to one link row awaiting an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkJob {
    pub kind: JobKind,
    pub link_id: Uuid,
}

impl LinkJob {
    pub fn channel(link_id: Uuid) -> Self {
        Self {
            kind: JobKind::Channel,
            link_id,
        }
    }

    pub fn ai(link_id: Uuid) -> Self {
        Self {
            kind: JobKind::Ai,
            link_id,
        }
    }
}

/// Job queue interface: `enqueue`, `claim_next`, `ack`.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job. Fails with [`QueueError::Full`] at capacity and
    /// [`QueueError::Closed`] after shutdown began.
    async fn enqueue(&self, job: LinkJob) -> Result<(), QueueError>;

    /// Wait for the next job. Returns `None` once the queue is closed and
    /// drained, which is the workers' signal to exit.
    async fn claim_next(&self) -> Option<LinkJob>;

    /// Acknowledge a claimed job. The in-memory backend removes jobs on
    /// claim, so this is bookkeeping only; a table-backed queue would
    /// delete the row here.
    async fn ack(&self, job: &LinkJob);

    /// Jobs currently waiting.
    async fn depth(&self) -> usize;

    /// Maximum jobs the queue holds.
    fn capacity(&self) -> usize;

    /// Stop accepting jobs and wake all waiting workers.
    fn close(&self);
}

/// Re-enqueue a job after a delay, e.g. for retry backoff. Best-effort:
/// if the queue is full or closed by then, the recovery sweep picks the
/// link up instead.
pub fn enqueue_after(queue: Arc<dyn JobQueue>, job: LinkJob, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = queue.enqueue(job).await {
            tracing::warn!(link_id = %job.link_id, error = %e, "Delayed re-enqueue dropped");
        }
    });
}

/// Bounded in-memory FIFO queue.
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<LinkJob>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: LinkJob) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        {
            let mut jobs = self.jobs.lock().await;
            if jobs.len() >= self.capacity {
                return Err(QueueError::Full {
                    size: jobs.len(),
                    capacity: self.capacity,
                });
            }
            jobs.push_back(job);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn claim_next(&self) -> Option<LinkJob> {
        loop {
            // Register for wakeup before checking, so a notify between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            {
                let mut jobs = self.jobs.lock().await;
                if let Some(job) = jobs.pop_front() {
                    return Some(job);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    async fn ack(&self, _job: &LinkJob) {}

    async fn depth(&self) -> usize {
        self.jobs.lock().await.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}
