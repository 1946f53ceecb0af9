//! Single-consumer worker draining the work queue.
//!
//! Exactly one worker task processes jobs strictly sequentially; there is no
//! parallel pipeline execution across tasks. The pipeline already performs
//! long streaming downloads against a rate-limited upstream, and a single
//! consumer keeps admission control predictable while ruling out concurrent
//! writers racing on the task store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::pipeline::ResourcePipeline;
use crate::queue::{JobKind, QueuedJob};
use crate::store::TaskStore;
use crate::task::{OverallStatus, TaskUpdate};

/// Cooldown after a queue-mechanics failure, preventing a tight failure loop.
const QUEUE_FAILURE_COOLDOWN: Duration = Duration::from_secs(5);

/// The single queue consumer.
pub struct Worker {
    store: Arc<TaskStore>,
    pipeline: Arc<ResourcePipeline>,
}

impl Worker {
    pub fn new(store: Arc<TaskStore>, pipeline: Arc<ResourcePipeline>) -> Self {
        Self { store, pipeline }
    }

    /// Spawn the consumption loop.
    ///
    /// The loop runs until the cancellation token fires or every sender is
    /// dropped. A failure while processing one item is recorded against that
    /// task and never kills the loop.
    pub fn spawn(
        self,
        mut rx: mpsc::Receiver<QueuedJob>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Worker started");
            loop {
                let job = tokio::select! {
                    _ = cancel_token.cancelled() => {
                        info!("Worker shutting down");
                        break;
                    }
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => {
                            info!("Work queue closed, worker stopping");
                            break;
                        }
                    },
                };

                self.process(job).await;
            }
        })
    }

    /// Process one queue item.
    ///
    /// The pipeline is run on its own task so a panic inside a stage is
    /// caught at the join and converted into a task failure instead of
    /// tearing down the consumption loop.
    async fn process(&self, job: QueuedJob) {
        let QueuedJob {
            task_id,
            kind,
            request,
        } = job;

        match kind {
            JobKind::Derive => {
                let pipeline = self.pipeline.clone();
                let id = task_id.clone();
                let handle = tokio::spawn(async move { pipeline.run(&id, &request).await });

                if let Err(join_err) = handle.await {
                    error!(task_id = %task_id, error = %join_err, "Pipeline task aborted");
                    let recorded = self
                        .store
                        .update(
                            &task_id,
                            TaskUpdate::new()
                                .with_overall_status(OverallStatus::Failed)
                                .with_error_message(format!("internal error: {join_err}"))
                                .with_updated_at(Utc::now()),
                        )
                        .await;
                    if !recorded {
                        // Could not even record the failure; back off so a
                        // persistent store problem cannot spin the loop.
                        warn!(task_id = %task_id, "Failed to record pipeline abort, cooling down");
                        tokio::time::sleep(QUEUE_FAILURE_COOLDOWN).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::Credentials;
    use crate::layout::ArtifactLayout;
    use crate::pipeline::{PipelineConfig, ResourcePipeline};
    use crate::producers::mock::MockSet;
    use crate::queue::{DeriveRequest, WorkQueue};
    use crate::task::{ResourceSelection, TaskSnapshot};

    fn job(task_id: &str, selection: ResourceSelection) -> QueuedJob {
        QueuedJob {
            task_id: task_id.to_string(),
            kind: JobKind::Derive,
            request: DeriveRequest {
                media_id: "m-1".to_string(),
                selection,
                credentials: Credentials::default(),
            },
        }
    }

    async fn wait_terminal(store: &TaskStore, task_id: &str) -> TaskSnapshot {
        for _ in 0..500 {
            if let Some(snap) = store.get(task_id).await
                && snap.overall_status.is_terminal()
            {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_panicking_stage_is_recorded_and_loop_survives() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::open(dir.path().join("tasks.json")).await);
        let mocks = MockSet::all_succeeding().with_panicking_primary();
        let layout = ArtifactLayout::new(dir.path().join("download"));
        let pipeline = Arc::new(ResourcePipeline::new(
            store.clone(),
            mocks.producers(),
            layout,
            PipelineConfig::default(),
        ));

        let (queue, rx) = WorkQueue::channel(4);
        let cancel = CancellationToken::new();
        let handle = Worker::new(store.clone(), pipeline).spawn(rx, cancel.clone());

        let primary_only = ResourceSelection {
            primary: true,
            ..Default::default()
        };
        let transcript_only = ResourceSelection {
            transcript: true,
            ..Default::default()
        };
        store
            .create(TaskSnapshot::new("t-panic", "m-1", primary_only, Utc::now()))
            .await;
        store
            .create(TaskSnapshot::new("t-after", "m-1", transcript_only, Utc::now()))
            .await;
        queue.enqueue(job("t-panic", primary_only)).unwrap();
        queue.enqueue(job("t-after", transcript_only)).unwrap();

        let failed = wait_terminal(&store, "t-panic").await;
        assert_eq!(failed.overall_status, OverallStatus::Failed);
        assert!(
            failed
                .error_message
                .unwrap()
                .starts_with("internal error:")
        );

        // The loop survived the panic and processed the next job.
        let next = wait_terminal(&store, "t-after").await;
        assert_eq!(next.overall_status, OverallStatus::Completed);

        cancel.cancel();
        handle.await.unwrap();
    }
}
