//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Producer and timeout variants never cross the pipeline boundary: the
/// pipeline converts them into `failed(reason)` resource statuses. Store
/// persistence errors are logged and swallowed inside the store itself.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Metadata fetch failed: {0}")]
    Metadata(String),

    #[error("Producer failed for {kind}: {reason}")]
    Producer { kind: String, reason: String },

    #[error("Attempt timed out after {0} seconds")]
    AttemptTimeout(u64),

    #[error("Overall timeout of {0} seconds exceeded")]
    OverallTimeout(u64),

    #[error("Malformed state: {0}")]
    MalformedState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Work queue is full")]
    QueueFull,

    #[error("IO error during {op} on {path}: {source}")]
    IoPath {
        op: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn producer(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Producer {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.display().to_string(),
            source,
        }
    }

    /// Short reason string recorded into a resource's `failed(reason)` status.
    ///
    /// Timeout variants map to the fixed reasons that callers match on;
    /// everything else is the error text truncated to a bounded length so a
    /// verbose upstream message cannot bloat the persisted snapshot.
    pub fn failure_reason(&self) -> String {
        match self {
            Error::OverallTimeout(_) => crate::task::REASON_OVERALL_TIMEOUT.to_string(),
            Error::AttemptTimeout(secs) => format!("attempt-timeout-{secs}s"),
            Error::Producer { reason, .. } => truncate_reason(reason),
            other => truncate_reason(&other.to_string()),
        }
    }
}

/// Maximum length of a failure reason embedded in a status string.
const MAX_REASON_LEN: usize = 80;

fn truncate_reason(reason: &str) -> String {
    let trimmed = reason.trim();
    if trimmed.chars().count() <= MAX_REASON_LEN {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_REASON_LEN).collect();
        cut.trim_end().to_string()
    }
}
