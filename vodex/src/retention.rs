//! Retention sweep over the task store.
//!
//! Terminal task records older than the retention window are deleted so the
//! persisted document does not grow without bound. Non-terminal records are
//! never touched regardless of age; a stuck task is an operator problem, not
//! the sweep's.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::TaskStore;

const DEFAULT_RETENTION_DAYS: u32 = 7;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Retention tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Age in days past which a terminal task is deleted. Zero disables the
    /// sweep entirely.
    pub retention_days: u32,
    /// Interval between background sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RetentionConfig {
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs.max(1);
        self
    }
}

/// Deletes expired terminal task records.
pub struct RetentionSweep {
    store: Arc<TaskStore>,
    config: RetentionConfig,
}

impl RetentionSweep {
    pub fn new(store: Arc<TaskStore>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Run one sweep, returning the number of records removed.
    ///
    /// Eligibility is judged on `updated_at`: a terminal task last touched
    /// before the cutoff is removed.
    pub async fn run_sweep(&self) -> usize {
        if self.config.retention_days == 0 {
            debug!("Retention disabled, skipping sweep");
            return 0;
        }

        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.config.retention_days));
        let mut removed = 0;

        for task in self.store.list_all().await {
            if task.overall_status.is_terminal() && task.updated_at < cutoff {
                if self.store.remove(&task.task_id).await {
                    debug!(task_id = %task.task_id, "Removed expired task record");
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(removed, "Retention sweep removed expired tasks");
        }
        removed
    }

    /// Spawn the periodic background sweep.
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Retention sweep task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        self.run_sweep().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{OverallStatus, ResourceSelection, TaskSnapshot, TaskUpdate};

    async fn store_with(dir: &tempfile::TempDir) -> Arc<TaskStore> {
        Arc::new(TaskStore::open(dir.path().join("tasks.json")).await)
    }

    async fn insert_task(store: &TaskStore, id: &str, status: OverallStatus, age_days: i64) {
        let at = Utc::now() - chrono::Duration::days(age_days);
        let snap = TaskSnapshot::new(
            id,
            "m-1",
            ResourceSelection {
                primary: true,
                ..Default::default()
            },
            at,
        );
        store.create(snap).await;
        store
            .update(
                id,
                TaskUpdate::new()
                    .with_overall_status(status)
                    .with_updated_at(at),
            )
            .await;
    }

    #[tokio::test]
    async fn test_sweep_removes_only_old_terminal_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir).await;
        insert_task(&store, "old-done", OverallStatus::Completed, 10).await;
        insert_task(&store, "old-failed", OverallStatus::Failed, 10).await;
        insert_task(&store, "old-active", OverallStatus::Downloading, 10).await;
        insert_task(&store, "recent-done", OverallStatus::Completed, 1).await;

        let sweep = RetentionSweep::new(store.clone(), RetentionConfig::default());
        assert_eq!(sweep.run_sweep().await, 2);

        assert!(store.get("old-done").await.is_none());
        assert!(store.get("old-failed").await.is_none());
        assert!(store.get("old-active").await.is_some());
        assert!(store.get("recent-done").await.is_some());
    }

    #[tokio::test]
    async fn test_zero_retention_disables_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir).await;
        insert_task(&store, "old-done", OverallStatus::Completed, 100).await;

        let config = RetentionConfig::default().with_retention_days(0);
        let sweep = RetentionSweep::new(store.clone(), config);
        assert_eq!(sweep.run_sweep().await, 0);
        assert!(store.get("old-done").await.is_some());
    }
}
