//! Resource derivation pipeline.
//!
//! One pipeline run takes a queued submission through metadata fetch and the
//! planned resource stages, recording per-resource status transitions into
//! the task store as they happen so polling clients always see live state.
//!
//! Stage rules:
//! - a stage whose dependency did not complete is marked
//!   `failed(dependency-unmet)` without invoking its producer
//! - a stage failure never aborts the run; independent stages still execute
//! - the transcript stage runs under bounded retry with per-attempt and
//!   overall timeouts
//! - the final aggregate is computed from the requested resources only

pub mod plan;
pub mod retry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use plan::StagePlan;
pub use retry::{RetryPolicy, RetryingExecutor};

use crate::layout::ArtifactLayout;
use crate::producers::{AiConfig, Producers};
use crate::queue::DeriveRequest;
use crate::store::TaskStore;
use crate::task::{
    MediaMetadata, OverallStatus, REASON_DEPENDENCY_UNMET, REASON_FILE_NOT_FOUND, ResourceKind,
    ResourceStatus, TaskUpdate,
};
use crate::utils::fs;
use crate::{Error, Result};

const DEFAULT_SUMMARY_MAX_CHECKS: u32 = 5;
const DEFAULT_SUMMARY_CHECK_DELAY_SECS: u64 = 2;
const DEFAULT_SUMMARY_SETTLE_DELAY_SECS: u64 = 1;

/// How long the summary stage waits for the transcript file to become
/// visible on disk before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryWaitConfig {
    pub max_checks: u32,
    pub check_delay_secs: u64,
    /// Pause after the file appears, letting a just-finished writer flush.
    pub settle_delay_secs: u64,
}

impl Default for SummaryWaitConfig {
    fn default() -> Self {
        Self {
            max_checks: DEFAULT_SUMMARY_MAX_CHECKS,
            check_delay_secs: DEFAULT_SUMMARY_CHECK_DELAY_SECS,
            settle_delay_secs: DEFAULT_SUMMARY_SETTLE_DELAY_SECS,
        }
    }
}

impl SummaryWaitConfig {
    pub fn with_max_checks(mut self, checks: u32) -> Self {
        self.max_checks = checks.max(1);
        self
    }

    pub fn with_check_delay_secs(mut self, secs: u64) -> Self {
        self.check_delay_secs = secs;
        self
    }

    pub fn with_settle_delay_secs(mut self, secs: u64) -> Self {
        self.settle_delay_secs = secs;
        self
    }
}

/// Pipeline tunables grouped for construction.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub transcript_retry: RetryPolicy,
    pub summary_wait: SummaryWaitConfig,
    pub ai: AiConfig,
}

/// Executes the resource stages for one task.
pub struct ResourcePipeline {
    store: Arc<TaskStore>,
    producers: Producers,
    layout: ArtifactLayout,
    config: PipelineConfig,
}

impl ResourcePipeline {
    pub fn new(
        store: Arc<TaskStore>,
        producers: Producers,
        layout: ArtifactLayout,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            producers,
            layout,
            config,
        }
    }

    /// Run the full derivation for one task.
    ///
    /// All outcomes, including total failure, are recorded against the task;
    /// this function itself does not fail.
    pub async fn run(&self, task_id: &str, request: &DeriveRequest) {
        info!(task_id = %task_id, media_id = %request.media_id, "Pipeline started");

        self.record(
            task_id,
            TaskUpdate::new().with_overall_status(OverallStatus::FetchingMetadata),
        )
        .await;

        // Metadata failure short-circuits the whole run: no resource stage
        // starts, so nothing is ever left `running`.
        let metadata = match self
            .producers
            .metadata
            .fetch(&request.media_id, &request.credentials)
            .await
        {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Metadata fetch failed");
                self.record(
                    task_id,
                    TaskUpdate::new()
                        .with_overall_status(OverallStatus::Failed)
                        .with_error_message(e.to_string()),
                )
                .await;
                return;
            }
        };

        self.record(
            task_id,
            TaskUpdate::new()
                .with_metadata(metadata.clone())
                .with_overall_status(OverallStatus::Downloading),
        )
        .await;

        let media_dir = self.layout.media_dir(&metadata.title, &metadata.media_id);
        if let Err(e) = fs::ensure_dir_all(&media_dir).await {
            warn!(task_id = %task_id, error = %e, "Failed to create media directory");
            self.record(
                task_id,
                TaskUpdate::new()
                    .with_overall_status(OverallStatus::Failed)
                    .with_error_message(e.to_string()),
            )
            .await;
            return;
        }

        let plan = StagePlan::for_selection(&request.selection);
        let mut completed: Vec<ResourceKind> = Vec::new();
        let mut primary_path: Option<PathBuf> = None;

        for &kind in plan.order() {
            if let Some(missing) = kind
                .dependencies()
                .iter()
                .find(|dep| !completed.contains(dep))
            {
                debug!(
                    task_id = %task_id,
                    resource = %kind,
                    dependency = %missing,
                    "Skipping stage, dependency did not complete"
                );
                self.record(
                    task_id,
                    TaskUpdate::new()
                        .with_resource_status(kind, ResourceStatus::failed(REASON_DEPENDENCY_UNMET)),
                )
                .await;
                continue;
            }

            self.record(
                task_id,
                TaskUpdate::new().with_resource_status(kind, ResourceStatus::Running),
            )
            .await;

            match self
                .run_stage(kind, &metadata, request, &mut primary_path)
                .await
            {
                Ok(()) => {
                    info!(task_id = %task_id, resource = %kind, "Stage completed");
                    completed.push(kind);
                    self.record(
                        task_id,
                        TaskUpdate::new().with_resource_status(kind, ResourceStatus::Completed),
                    )
                    .await;
                }
                Err(e) => {
                    warn!(task_id = %task_id, resource = %kind, error = %e, "Stage failed");
                    self.record(
                        task_id,
                        TaskUpdate::new()
                            .with_resource_status(kind, ResourceStatus::failed(e.failure_reason())),
                    )
                    .await;
                }
            }
        }

        self.finalize(task_id).await;
    }

    /// Compute and record the aggregate outcome from the stored snapshot.
    async fn finalize(&self, task_id: &str) {
        let Some(snapshot) = self.store.get(task_id).await else {
            warn!(task_id = %task_id, "Task disappeared before finalization");
            return;
        };

        let aggregate = snapshot.aggregate_status();
        let mut update = TaskUpdate::new().with_overall_status(aggregate);
        if aggregate == OverallStatus::Failed {
            update = update.with_error_message("one or more requested resources failed");
        }
        self.record(task_id, update).await;
        info!(task_id = %task_id, status = %aggregate, "Pipeline finished");
    }

    async fn run_stage(
        &self,
        kind: ResourceKind,
        metadata: &MediaMetadata,
        request: &DeriveRequest,
        primary_path: &mut Option<PathBuf>,
    ) -> Result<()> {
        let output = self
            .layout
            .artifact_path(kind, &metadata.title, &metadata.media_id);

        match kind {
            ResourceKind::Primary => {
                if tokio::fs::try_exists(&output).await.unwrap_or(false) {
                    // A previous run already fetched this media; reuse it.
                    info!(path = %output.display(), "Reusing existing primary artifact");
                    *primary_path = Some(output);
                    return Ok(());
                }
                let produced = self
                    .producers
                    .primary
                    .produce(metadata, &request.selection, &request.credentials, &output)
                    .await?;
                *primary_path = Some(produced);
                Ok(())
            }
            ResourceKind::Secondary => {
                let primary = require_primary(primary_path)?;
                self.producers.secondary.produce(primary, &output).await
            }
            ResourceKind::Index => {
                let primary = require_primary(primary_path)?;
                self.producers.index.produce(primary, &output).await
            }
            ResourceKind::Transcript => {
                let executor = RetryingExecutor::new(self.config.transcript_retry);
                let producer = self.producers.transcript.clone();
                let metadata = metadata.clone();
                let credentials = request.credentials.clone();
                executor
                    .run("transcript", move || {
                        let producer = producer.clone();
                        let metadata = metadata.clone();
                        let credentials = credentials.clone();
                        let output = output.clone();
                        async move { producer.produce(&metadata, &credentials, &output).await }
                    })
                    .await
            }
            ResourceKind::Summary => {
                let transcript = self.layout.artifact_path(
                    ResourceKind::Transcript,
                    &metadata.title,
                    &metadata.media_id,
                );
                self.wait_for_file(&transcript).await?;
                let summary_json = self
                    .producers
                    .summary
                    .produce(&transcript, &self.config.ai)
                    .await?;
                fs::write_atomic(&output, summary_json.as_bytes()).await
            }
        }
    }

    /// Poll for an upstream artifact to become visible on disk.
    ///
    /// The transcript stage reporting success and its file being readable
    /// are not the same instant when the producer hands work to an external
    /// agent, so the summary stage tolerates a short lag.
    async fn wait_for_file(&self, path: &std::path::Path) -> Result<()> {
        let wait = &self.config.summary_wait;
        for check in 1..=wait.max_checks.max(1) {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                tokio::time::sleep(Duration::from_secs(wait.settle_delay_secs)).await;
                return Ok(());
            }
            debug!(path = %path.display(), check, "Waiting for upstream artifact");
            if check < wait.max_checks {
                tokio::time::sleep(Duration::from_secs(wait.check_delay_secs)).await;
            }
        }
        Err(Error::producer("summary", REASON_FILE_NOT_FOUND))
    }

    /// Record a task update stamped with the current time.
    async fn record(&self, task_id: &str, update: TaskUpdate) {
        self.store
            .update(task_id, update.with_updated_at(Utc::now()))
            .await;
    }
}

fn require_primary<'a>(primary_path: &'a Option<PathBuf>) -> Result<&'a PathBuf> {
    primary_path.as_ref().ok_or_else(|| {
        Error::MalformedState("primary artifact path missing after completed stage".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_wait_defaults() {
        let wait = SummaryWaitConfig::default();
        assert_eq!(wait.max_checks, 5);
        assert_eq!(wait.check_delay_secs, 2);
        assert_eq!(wait.settle_delay_secs, 1);
    }

    #[test]
    fn test_summary_wait_builders_floor_checks() {
        let wait = SummaryWaitConfig::default()
            .with_max_checks(0)
            .with_check_delay_secs(0)
            .with_settle_delay_secs(0);
        assert_eq!(wait.max_checks, 1);
        assert_eq!(wait.check_delay_secs, 0);
    }
}
