//! End-to-end pipeline scenarios against scripted producers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use vodex::config::Credentials;
use vodex::layout::ArtifactLayout;
use vodex::pipeline::{PipelineConfig, ResourcePipeline, RetryPolicy, SummaryWaitConfig};
use vodex::producers::mock::{MockBehavior, MockSet};
use vodex::queue::DeriveRequest;
use vodex::store::TaskStore;
use vodex::task::{OverallStatus, ResourceKind, ResourceSelection, ResourceStatus, TaskSnapshot};

const TASK_ID: &str = "t-1";
const MEDIA_ID: &str = "m-1";

/// Fast knobs so scenarios run without real-time waits.
fn fast_config() -> PipelineConfig {
    PipelineConfig {
        transcript_retry: RetryPolicy::default()
            .with_max_attempts(3)
            .with_attempt_timeout_secs(5)
            .with_retry_delay_secs(0),
        summary_wait: SummaryWaitConfig::default()
            .with_max_checks(2)
            .with_check_delay_secs(0)
            .with_settle_delay_secs(0),
        ..Default::default()
    }
}

async fn setup(
    mocks: &MockSet,
    config: PipelineConfig,
    selection: ResourceSelection,
) -> (TempDir, Arc<TaskStore>, ResourcePipeline, DeriveRequest) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::open(dir.path().join("tasks.json")).await);
    store
        .create(TaskSnapshot::new(TASK_ID, MEDIA_ID, selection, Utc::now()))
        .await;

    let layout = ArtifactLayout::new(dir.path().join("download"));
    let pipeline = ResourcePipeline::new(store.clone(), mocks.producers(), layout, config);
    let request = DeriveRequest {
        media_id: MEDIA_ID.to_string(),
        selection,
        credentials: Credentials::default(),
    };
    (dir, store, pipeline, request)
}

fn status_of(snapshot: &TaskSnapshot, kind: ResourceKind) -> ResourceStatus {
    snapshot
        .resource_status
        .get(&kind)
        .cloned()
        .unwrap_or_else(|| panic!("no status recorded for {kind}"))
}

#[tokio::test]
async fn full_selection_success_completes_every_resource() {
    let mocks = MockSet::all_succeeding();
    let selection = ResourceSelection {
        primary: true,
        secondary: true,
        transcript: true,
        summary: true,
        index: true,
    };
    let (dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Completed);
    for kind in ResourceKind::ALL {
        assert_eq!(status_of(&snap, kind), ResourceStatus::Completed);
    }
    assert!(snap.metadata.is_some());
    assert_eq!(snap.error_message, None);

    // Artifacts land in one media directory; the summary is the producer's
    // JSON written by the pipeline itself.
    let media_dir = dir.path().join("download").join("Test Media");
    assert!(media_dir.join("m-1.mp4").exists());
    assert!(media_dir.join("m-1.srt").exists());
    let summary = std::fs::read_to_string(media_dir.join("m-1_summary.json")).unwrap();
    assert!(summary.contains("summary"));
}

#[tokio::test]
async fn primary_failure_skips_dependents_without_invoking_them() {
    let mocks = MockSet::all_succeeding().with_failing_primary();
    let selection = ResourceSelection {
        primary: true,
        secondary: true,
        transcript: true,
        index: true,
        ..Default::default()
    };
    let (_dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Failed);
    assert!(matches!(
        status_of(&snap, ResourceKind::Primary),
        ResourceStatus::Failed(_)
    ));
    assert_eq!(
        status_of(&snap, ResourceKind::Secondary),
        ResourceStatus::failed("dependency-unmet")
    );
    assert_eq!(
        status_of(&snap, ResourceKind::Index),
        ResourceStatus::failed("dependency-unmet")
    );
    // The independent transcript stage still ran to completion.
    assert_eq!(
        status_of(&snap, ResourceKind::Transcript),
        ResourceStatus::Completed
    );

    assert_eq!(mocks.secondary.calls(), 0);
    assert_eq!(mocks.index.calls(), 0);
    assert_eq!(mocks.transcript.calls(), 1);
    assert!(snap.error_message.is_some());
}

#[tokio::test]
async fn metadata_failure_short_circuits_before_any_stage() {
    let mocks = MockSet::all_succeeding().with_failing_metadata();
    let selection = ResourceSelection {
        primary: true,
        secondary: true,
        ..Default::default()
    };
    let (_dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Failed);
    assert!(snap.error_message.is_some());
    // No resource stage started: everything stays queued.
    assert_eq!(
        status_of(&snap, ResourceKind::Primary),
        ResourceStatus::Queued
    );
    assert_eq!(
        status_of(&snap, ResourceKind::Secondary),
        ResourceStatus::Queued
    );
    assert_eq!(mocks.primary.calls(), 0);
    assert_eq!(mocks.secondary.calls(), 0);
}

#[tokio::test]
async fn transcript_retries_until_success() {
    let mocks = MockSet::all_succeeding().with_transcript_script(vec![
        MockBehavior::Fail("agent busy".to_string()),
        MockBehavior::Fail("agent busy".to_string()),
        MockBehavior::Succeed,
    ]);
    let selection = ResourceSelection {
        transcript: true,
        summary: true,
        ..Default::default()
    };
    let (_dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Completed);
    assert_eq!(mocks.transcript.calls(), 3);
    assert_eq!(
        status_of(&snap, ResourceKind::Transcript),
        ResourceStatus::Completed
    );
    assert_eq!(
        status_of(&snap, ResourceKind::Summary),
        ResourceStatus::Completed
    );
}

#[tokio::test]
async fn transcript_exhaustion_fails_summary_as_dependency_unmet() {
    let mocks = MockSet::all_succeeding().with_transcript_script(vec![
        MockBehavior::Fail("agent down".to_string()),
        MockBehavior::Fail("agent down".to_string()),
        MockBehavior::Fail("agent down".to_string()),
    ]);
    let selection = ResourceSelection {
        transcript: true,
        summary: true,
        ..Default::default()
    };
    let (_dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Failed);
    assert_eq!(mocks.transcript.calls(), 3);
    assert_eq!(
        status_of(&snap, ResourceKind::Transcript),
        ResourceStatus::failed("agent down")
    );
    assert_eq!(
        status_of(&snap, ResourceKind::Summary),
        ResourceStatus::failed("dependency-unmet")
    );
    assert_eq!(mocks.summary.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_transcript_records_overall_timeout() {
    let hang = MockBehavior::Hang(Duration::from_secs(100_000));
    let mocks = MockSet::all_succeeding()
        .with_transcript_script(vec![hang.clone(), hang.clone(), hang]);
    let config = PipelineConfig {
        transcript_retry: RetryPolicy {
            max_attempts: 3,
            attempt_timeout_secs: 5,
            retry_delay_secs: 1,
            overall_grace_secs: 0,
        },
        summary_wait: SummaryWaitConfig::default()
            .with_max_checks(1)
            .with_check_delay_secs(0)
            .with_settle_delay_secs(0),
        ..Default::default()
    };
    let selection = ResourceSelection {
        transcript: true,
        ..Default::default()
    };
    let (_dir, store, pipeline, request) = setup(&mocks, config, selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Failed);
    assert_eq!(
        status_of(&snap, ResourceKind::Transcript),
        ResourceStatus::failed("overall-timeout")
    );
    // The deadline fires during the third attempt; no attempt starts after it.
    assert_eq!(mocks.transcript.calls(), 3);
}

#[tokio::test]
async fn invisible_transcript_file_fails_summary_with_file_not_found() {
    let mocks = MockSet::all_succeeding()
        .with_transcript_script(vec![MockBehavior::SucceedWithoutFile]);
    let selection = ResourceSelection {
        transcript: true,
        summary: true,
        ..Default::default()
    };
    let (_dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Failed);
    assert_eq!(
        status_of(&snap, ResourceKind::Transcript),
        ResourceStatus::Completed
    );
    assert_eq!(
        status_of(&snap, ResourceKind::Summary),
        ResourceStatus::failed("file-not-found")
    );
    assert_eq!(mocks.summary.calls(), 0);
}

#[tokio::test]
async fn unrequested_dependency_runs_but_does_not_gate_outcome() {
    let mocks = MockSet::all_succeeding();
    let selection = ResourceSelection {
        secondary: true,
        ..Default::default()
    };
    let (_dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Completed);
    // Primary ran as a closure dependency and its status is visible.
    assert_eq!(mocks.primary.calls(), 1);
    assert_eq!(
        status_of(&snap, ResourceKind::Primary),
        ResourceStatus::Completed
    );
    assert_eq!(
        status_of(&snap, ResourceKind::Secondary),
        ResourceStatus::Completed
    );
}

#[tokio::test]
async fn secondary_failure_fails_task_but_not_other_stages() {
    let mocks = MockSet::all_succeeding().with_failing_secondary();
    let selection = ResourceSelection {
        primary: true,
        secondary: true,
        index: true,
        ..Default::default()
    };
    let (_dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Failed);
    assert_eq!(
        status_of(&snap, ResourceKind::Primary),
        ResourceStatus::Completed
    );
    assert!(matches!(
        status_of(&snap, ResourceKind::Secondary),
        ResourceStatus::Failed(_)
    ));
    // Index depends only on primary, so it still completed.
    assert_eq!(
        status_of(&snap, ResourceKind::Index),
        ResourceStatus::Completed
    );
}

#[tokio::test]
async fn existing_primary_artifact_is_reused() {
    let mocks = MockSet::all_succeeding();
    let selection = ResourceSelection {
        primary: true,
        secondary: true,
        ..Default::default()
    };
    let (dir, store, pipeline, request) = setup(&mocks, fast_config(), selection).await;

    let media_dir = dir.path().join("download").join("Test Media");
    std::fs::create_dir_all(&media_dir).unwrap();
    std::fs::write(media_dir.join("m-1.mp4"), b"already here").unwrap();

    pipeline.run(TASK_ID, &request).await;

    let snap = store.get(TASK_ID).await.unwrap();
    assert_eq!(snap.overall_status, OverallStatus::Completed);
    assert_eq!(mocks.primary.calls(), 0);
    assert_eq!(mocks.secondary.calls(), 1);
}
