//! Bounded work queue feeding the single worker.
//!
//! The queue is an explicit message-passing channel owned by the task
//! service: submissions go through [`WorkQueue::enqueue`], the worker owns
//! the receiving end. `try_send` keeps admission control simple: when the
//! queue is full the submission is rejected rather than blocking the caller.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::Credentials;
use crate::task::ResourceSelection;
use crate::{Error, Result};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Kind of work carried by a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Derive the requested artifacts for one media identifier.
    Derive,
}

/// Submission parameters captured when the task was created.
///
/// Credentials are snapshotted at submission time so a later credential
/// change does not affect tasks already in flight.
#[derive(Debug, Clone)]
pub struct DeriveRequest {
    pub media_id: String,
    pub selection: ResourceSelection,
    pub credentials: Credentials,
}

/// One enqueued unit of work.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub task_id: String,
    pub kind: JobKind,
    pub request: DeriveRequest,
}

/// Sending half of the work queue.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<QueuedJob>,
}

impl WorkQueue {
    /// Create a queue and the receiver the worker will drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a job, failing fast when the queue is full or shut down.
    pub fn enqueue(&self, job: QueuedJob) -> Result<()> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                warn!(task_id = %job.task_id, "Work queue full, rejecting submission");
                Error::QueueFull
            }
            mpsc::error::TrySendError::Closed(job) => {
                warn!(task_id = %job.task_id, "Work queue closed, rejecting submission");
                Error::Other("work queue closed".to_string())
            }
        })
    }

    /// Number of jobs currently waiting.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> QueuedJob {
        QueuedJob {
            task_id: id.to_string(),
            kind: JobKind::Derive,
            request: DeriveRequest {
                media_id: "m-1".to_string(),
                selection: ResourceSelection::default(),
                credentials: Credentials::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_enqueue_preserves_fifo_order() {
        let (queue, mut rx) = WorkQueue::channel(4);
        queue.enqueue(job("a")).unwrap();
        queue.enqueue(job("b")).unwrap();

        assert_eq!(rx.recv().await.unwrap().task_id, "a");
        assert_eq!(rx.recv().await.unwrap().task_id, "b");
    }

    #[tokio::test]
    async fn test_enqueue_rejects_when_full() {
        let (queue, _rx) = WorkQueue::channel(1);
        queue.enqueue(job("a")).unwrap();

        assert!(matches!(queue.enqueue(job("b")), Err(Error::QueueFull)));
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_fails_after_receiver_dropped() {
        let (queue, rx) = WorkQueue::channel(1);
        drop(rx);
        assert!(queue.enqueue(job("a")).is_err());
    }
}
