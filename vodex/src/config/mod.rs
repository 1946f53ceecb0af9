//! Application configuration.
//!
//! One JSON file, deserialized with serde defaults so a config written by an
//! older build keeps working after new fields are added. A missing file is
//! created with defaults; an unreadable one falls back to defaults with a
//! warning rather than refusing to start.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Result;
use crate::pipeline::{RetryPolicy, SummaryWaitConfig};
use crate::producers::AiConfig;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::retention::RetentionConfig;
use crate::utils::fs;

/// Source platform credentials, snapshotted into each submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Session cookie sent with authenticated platform requests.
    pub cookie: String,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.cookie.trim().is_empty()
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for derived artifacts.
    pub download_dir: PathBuf,
    /// Path of the persisted task document.
    pub tasks_file: PathBuf,
    /// Directory for rotated log files.
    pub log_dir: PathBuf,
    /// Bounded work queue capacity.
    pub queue_capacity: usize,
    pub credentials: Credentials,
    pub ai: AiConfig,
    pub transcript_retry: RetryPolicy,
    pub summary_wait: SummaryWaitConfig,
    pub retention: RetentionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("data/download"),
            tasks_file: PathBuf::from("data/tasks.json"),
            log_dir: PathBuf::from("logs"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            credentials: Credentials::default(),
            ai: AiConfig::default(),
            transcript_retry: RetryPolicy::default(),
            summary_wait: SummaryWaitConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file is written out with defaults so the operator has a
    /// template to edit. A file that exists but cannot be parsed is left in
    /// place and defaults are used for this run.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<AppConfig>(&bytes) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded configuration");
                    Ok(config)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e,
                        "Configuration is malformed, using defaults");
                    Ok(Self::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path).await?;
                info!(path = %path.display(), "Wrote default configuration");
                Ok(config)
            }
            Err(e) => Err(crate::Error::io_path("read", path, e)),
        }
    }

    /// Persist the configuration atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec_pretty(self)?;
        fs::write_atomic(path, &contents).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.credentials.cookie = "SESSDATA=abc".to_string();
        config.transcript_retry = config.transcript_retry.with_max_attempts(5);
        config.save(&path).await.unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded.credentials.cookie, "SESSDATA=abc");
        assert_eq!(loaded.transcript_retry.max_attempts, 5);
    }

    #[tokio::test]
    async fn test_partial_file_backfills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, br#"{"queue_capacity": 8}"#)
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.retention.retention_days, 7);
    }

    #[tokio::test]
    async fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"{ nope").await.unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }
}
