//! Task data model: resource kinds, statuses, snapshots and merge updates.
//!
//! A task tracks the derivation of a set of artifacts from one media
//! identifier. Everything here serializes into the single persisted JSON
//! document managed by the task store, so the status representations are
//! chosen to match that document's shape (`"failed(reason)"` strings rather
//! than nested objects).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// Terminal reason when a prerequisite resource did not complete.
pub const REASON_DEPENDENCY_UNMET: &str = "dependency-unmet";

/// Terminal reason when the retrying executor's overall timeout elapsed.
pub const REASON_OVERALL_TIMEOUT: &str = "overall-timeout";

/// Terminal reason when an upstream artifact never became visible on disk.
pub const REASON_FILE_NOT_FOUND: &str = "file-not-found";

/// One of the derivable artifact types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// The primary media file fetched from the source platform.
    Primary,
    /// Secondary file extracted from the primary artifact (audio track).
    Secondary,
    /// Transcript fetched through the unreliable rendering agent.
    Transcript,
    /// Generated-text summary derived from the transcript.
    Summary,
    /// Thumbnail index derived from the primary artifact.
    Index,
}

impl ResourceKind {
    /// All kinds in declaration order.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Primary,
        ResourceKind::Secondary,
        ResourceKind::Transcript,
        ResourceKind::Summary,
        ResourceKind::Index,
    ];

    /// Resources that must be `completed` before this one may run.
    ///
    /// This is the stage dependency graph: primary → {secondary, index},
    /// transcript → summary. The pipeline evaluates it topologically, so
    /// adding a kind here is all that is needed to slot a new stage in.
    pub fn dependencies(&self) -> &'static [ResourceKind] {
        match self {
            ResourceKind::Primary | ResourceKind::Transcript => &[],
            ResourceKind::Secondary | ResourceKind::Index => &[ResourceKind::Primary],
            ResourceKind::Summary => &[ResourceKind::Transcript],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Primary => "primary",
            ResourceKind::Secondary => "secondary",
            ResourceKind::Transcript => "transcript",
            ResourceKind::Summary => "summary",
            ResourceKind::Index => "index",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource status.
///
/// Serialized as a plain string (`"queued"`, `"running"`, `"completed"`,
/// `"failed(reason)"`) so polling clients and the persisted document see the
/// same compact representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStatus {
    Queued,
    Running,
    Completed,
    Failed(String),
}

impl ResourceStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        ResourceStatus::Failed(reason.into())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceStatus::Completed | ResourceStatus::Failed(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ResourceStatus::Completed)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::Queued => f.write_str("queued"),
            ResourceStatus::Running => f.write_str("running"),
            ResourceStatus::Completed => f.write_str("completed"),
            ResourceStatus::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ResourceStatus::Queued),
            "running" => Ok(ResourceStatus::Running),
            "completed" => Ok(ResourceStatus::Completed),
            other => {
                if let Some(reason) = other
                    .strip_prefix("failed(")
                    .and_then(|r| r.strip_suffix(')'))
                {
                    Ok(ResourceStatus::Failed(reason.to_string()))
                } else {
                    Err(format!("unrecognized resource status: {other}"))
                }
            }
        }
    }
}

impl Serialize for ResourceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Aggregate task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Queued,
    FetchingMetadata,
    Downloading,
    Completed,
    Failed,
}

impl OverallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OverallStatus::Completed | OverallStatus::Failed)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Queued => "queued",
            OverallStatus::FetchingMetadata => "fetching_metadata",
            OverallStatus::Downloading => "downloading",
            OverallStatus::Completed => "completed",
            OverallStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which resources a submission asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSelection {
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub secondary: bool,
    #[serde(default)]
    pub transcript: bool,
    #[serde(default)]
    pub summary: bool,
    #[serde(default)]
    pub index: bool,
}

impl ResourceSelection {
    pub fn is_requested(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Primary => self.primary,
            ResourceKind::Secondary => self.secondary,
            ResourceKind::Transcript => self.transcript,
            ResourceKind::Summary => self.summary,
            ResourceKind::Index => self.index,
        }
    }

    /// Requested kinds in declaration order.
    pub fn requested(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .filter(|k| self.is_requested(*k))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.requested().is_empty()
    }
}

/// Metadata snapshot captured from the source platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub media_id: String,
    pub title: String,
    pub owner: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub duration_secs: u64,
    /// Publish time as a unix timestamp.
    #[serde(default)]
    pub published_at: i64,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub favorite_count: u64,
}

/// The full persisted record for one task at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub media_id: String,
    pub requested: ResourceSelection,
    pub overall_status: OverallStatus,
    #[serde(default)]
    pub resource_status: BTreeMap<ResourceKind, ResourceStatus>,
    #[serde(default)]
    pub metadata: Option<MediaMetadata>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSnapshot {
    /// Create the initial record for a fresh submission.
    ///
    /// Every requested resource starts `queued`; the aggregate starts
    /// `queued` and only the worker/pipeline moves it from there.
    pub fn new(
        task_id: impl Into<String>,
        media_id: impl Into<String>,
        requested: ResourceSelection,
        now: DateTime<Utc>,
    ) -> Self {
        let mut resource_status = BTreeMap::new();
        for kind in requested.requested() {
            resource_status.insert(kind, ResourceStatus::Queued);
        }
        Self {
            task_id: task_id.into(),
            media_id: media_id.into(),
            requested,
            overall_status: OverallStatus::Queued,
            resource_status,
            metadata: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a merge update.
    ///
    /// Top-level fields are replaced when present in the update; the
    /// `resource_status` sub-map is merged key-by-key (union of keys) so two
    /// stages updating different resources never clobber each other.
    ///
    /// A terminal `overall_status` is write-protected: once a task completes
    /// or fails it stays that way until the retention sweep deletes it.
    pub fn apply(&mut self, update: TaskUpdate) {
        if let Some(status) = update.overall_status {
            if self.overall_status.is_terminal() && status != self.overall_status {
                warn!(
                    task_id = %self.task_id,
                    from = %self.overall_status,
                    to = %status,
                    "Ignoring overall status change on terminal task"
                );
            } else {
                self.overall_status = status;
            }
        }
        if let Some(metadata) = update.metadata {
            self.metadata = Some(metadata);
        }
        if let Some(message) = update.error_message {
            self.error_message = Some(message);
        }
        for (kind, status) in update.resource_status {
            self.resource_status.insert(kind, status);
        }
        if let Some(at) = update.updated_at {
            self.updated_at = at;
        }
    }

    /// Compute the aggregate from the requested resources' statuses.
    ///
    /// `Completed` iff every requested resource completed; `Failed`
    /// otherwise. Only meaningful once all requested stages are terminal.
    pub fn aggregate_status(&self) -> OverallStatus {
        let all_completed = self.requested.requested().into_iter().all(|kind| {
            self.resource_status
                .get(&kind)
                .is_some_and(|s| s.is_completed())
        });
        if all_completed {
            OverallStatus::Completed
        } else {
            OverallStatus::Failed
        }
    }

    /// Whether the given resource is recorded as completed.
    pub fn resource_completed(&self, kind: ResourceKind) -> bool {
        self.resource_status
            .get(&kind)
            .is_some_and(|s| s.is_completed())
    }
}

/// A partial update merged into a snapshot by the task store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub overall_status: Option<OverallStatus>,
    pub metadata: Option<MediaMetadata>,
    pub error_message: Option<String>,
    pub resource_status: BTreeMap<ResourceKind, ResourceStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overall_status(mut self, status: OverallStatus) -> Self {
        self.overall_status = Some(status);
        self
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_resource_status(mut self, kind: ResourceKind, status: ResourceStatus) -> Self {
        self.resource_status.insert(kind, status);
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}
