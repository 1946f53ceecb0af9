//! Task service: the single entry point for submissions and status reads.
//!
//! Owns the store, the bounded work queue and the background tasks (worker,
//! retention sweep). Submission is create-then-enqueue; a submission the
//! queue rejects is rolled back so no orphaned `queued` record survives.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::config::{AppConfig, Credentials};
use crate::layout::ArtifactLayout;
use crate::logging;
use crate::pipeline::{PipelineConfig, ResourcePipeline};
use crate::producers::Producers;
use crate::queue::{DeriveRequest, JobKind, QueuedJob, WorkQueue};
use crate::retention::RetentionSweep;
use crate::store::TaskStore;
use crate::task::{ResourceSelection, TaskSnapshot};
use crate::utils::fs;
use crate::worker::Worker;
use crate::{Error, Result};

pub struct TaskService {
    store: Arc<TaskStore>,
    queue: WorkQueue,
    credentials: Credentials,
    cancel_token: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskService {
    /// Build the service and spawn its background tasks.
    pub async fn start(config: &AppConfig, producers: Producers) -> Result<Arc<Self>> {
        fs::ensure_dir_all(&config.download_dir).await?;
        fs::ensure_parent_dir(&config.tasks_file).await?;

        let store = Arc::new(TaskStore::open(config.tasks_file.clone()).await);
        let (queue, rx) = WorkQueue::channel(config.queue_capacity.max(1));
        let layout = ArtifactLayout::new(&config.download_dir);
        let pipeline = Arc::new(ResourcePipeline::new(
            store.clone(),
            producers,
            layout,
            PipelineConfig {
                transcript_retry: config.transcript_retry,
                summary_wait: config.summary_wait,
                ai: config.ai.clone(),
            },
        ));

        let cancel_token = CancellationToken::new();
        let worker_handle =
            Worker::new(store.clone(), pipeline).spawn(rx, cancel_token.child_token());
        let retention_handle =
            RetentionSweep::new(store.clone(), config.retention).spawn(cancel_token.child_token());
        let log_cleanup_handle =
            logging::start_retention_cleanup(config.log_dir.clone(), cancel_token.child_token());

        info!("Task service started");
        Ok(Arc::new(Self {
            store,
            queue,
            credentials: config.credentials.clone(),
            cancel_token,
            background: Mutex::new(vec![worker_handle, retention_handle, log_cleanup_handle]),
        }))
    }

    /// Submit a derivation request, returning the new task id.
    pub async fn submit(&self, media_id: &str, selection: ResourceSelection) -> Result<String> {
        let media_id = media_id.trim();
        if media_id.is_empty() {
            return Err(Error::InvalidSubmission(
                "media id must not be empty".to_string(),
            ));
        }
        if selection.is_empty() {
            return Err(Error::InvalidSubmission(
                "at least one resource must be requested".to_string(),
            ));
        }
        if selection.summary && !selection.transcript {
            return Err(Error::InvalidSubmission(
                "summary requires the transcript to be requested".to_string(),
            ));
        }

        let task_id = format!("derive_{}_{}", media_id, Uuid::new_v4().simple());
        let snapshot = TaskSnapshot::new(&task_id, media_id, selection, Utc::now());
        if !self.store.create(snapshot).await {
            return Err(Error::Other(format!("task id collision: {task_id}")));
        }

        let job = QueuedJob {
            task_id: task_id.clone(),
            kind: JobKind::Derive,
            request: DeriveRequest {
                media_id: media_id.to_string(),
                selection,
                credentials: self.credentials.clone(),
            },
        };
        if let Err(e) = self.queue.enqueue(job) {
            // Roll back so a rejected submission leaves no queued orphan.
            self.store.remove(&task_id).await;
            return Err(e);
        }

        info!(task_id = %task_id, media_id = %media_id, "Submission accepted");
        Ok(task_id)
    }

    /// Point read of one task's current snapshot.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot> {
        self.store
            .get(task_id)
            .await
            .ok_or_else(|| Error::not_found("task", task_id))
    }

    pub async fn list_active(&self) -> Vec<TaskSnapshot> {
        self.store.list_active().await
    }

    pub async fn list_all(&self) -> Vec<TaskSnapshot> {
        self.store.list_all().await
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handles = std::mem::take(&mut *self.background.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!("Task service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::mock::MockSet;

    async fn test_config(dir: &tempfile::TempDir) -> AppConfig {
        AppConfig {
            download_dir: dir.path().join("download"),
            tasks_file: dir.path().join("tasks.json"),
            log_dir: dir.path().join("logs"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_validations() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir).await;
        let mocks = MockSet::all_succeeding();
        let service = TaskService::start(&config, mocks.producers()).await.unwrap();

        let primary_only = ResourceSelection {
            primary: true,
            ..Default::default()
        };
        assert!(matches!(
            service.submit("", primary_only).await,
            Err(Error::InvalidSubmission(_))
        ));
        assert!(matches!(
            service.submit("m-1", ResourceSelection::default()).await,
            Err(Error::InvalidSubmission(_))
        ));
        assert!(matches!(
            service
                .submit(
                    "m-1",
                    ResourceSelection {
                        summary: true,
                        ..Default::default()
                    }
                )
                .await,
            Err(Error::InvalidSubmission(_))
        ));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_creates_task_and_get_reads_it() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir).await;
        let mocks = MockSet::all_succeeding();
        let service = TaskService::start(&config, mocks.producers()).await.unwrap();

        let selection = ResourceSelection {
            primary: true,
            ..Default::default()
        };
        let task_id = service.submit("m-1", selection).await.unwrap();
        let snap = service.get_task(&task_id).await.unwrap();
        assert_eq!(snap.media_id, "m-1");

        assert!(matches!(
            service.get_task("nope").await,
            Err(Error::NotFound { .. })
        ));

        service.shutdown().await;
    }
}
