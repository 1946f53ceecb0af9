//! Producer seams for each resource kind.
//!
//! The pipeline orchestrates; producers do the platform-specific work of
//! actually materializing an artifact. Every producer is an object-safe
//! async trait so tests can swap in scripted implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::Credentials;
use crate::task::{MediaMetadata, ResourceSelection};

/// Settings for the AI summarization backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Fetches descriptive metadata for a media identifier.
#[async_trait]
pub trait MetadataProducer: Send + Sync {
    async fn fetch(&self, media_id: &str, credentials: &Credentials) -> Result<MediaMetadata>;
}

/// Produces the primary artifact (the media itself).
///
/// Returns the path of the produced file, which may differ from `output`
/// when an already-present file is reused.
#[async_trait]
pub trait PrimaryProducer: Send + Sync {
    async fn produce(
        &self,
        metadata: &MediaMetadata,
        options: &ResourceSelection,
        credentials: &Credentials,
        output: &Path,
    ) -> Result<PathBuf>;
}

/// Derives the secondary artifact from a completed primary file.
#[async_trait]
pub trait SecondaryProducer: Send + Sync {
    async fn produce(&self, primary_path: &Path, output: &Path) -> Result<()>;
}

/// Produces the transcript artifact. Invoked under retry; must be safe to
/// re-run after a failed or abandoned attempt.
#[async_trait]
pub trait TranscriptProducer: Send + Sync {
    async fn produce(
        &self,
        metadata: &MediaMetadata,
        credentials: &Credentials,
        output: &Path,
    ) -> Result<()>;
}

/// Produces a summary from a transcript file, returning the summary document
/// as a JSON string. The pipeline owns writing it to disk.
#[async_trait]
pub trait SummaryProducer: Send + Sync {
    async fn produce(&self, transcript_path: &Path, ai: &AiConfig) -> Result<String>;
}

/// Derives the seek index artifact from a completed primary file.
#[async_trait]
pub trait IndexProducer: Send + Sync {
    async fn produce(&self, primary_path: &Path, output: &Path) -> Result<()>;
}

/// The full producer set the pipeline runs against.
#[derive(Clone)]
pub struct Producers {
    pub metadata: Arc<dyn MetadataProducer>,
    pub primary: Arc<dyn PrimaryProducer>,
    pub secondary: Arc<dyn SecondaryProducer>,
    pub transcript: Arc<dyn TranscriptProducer>,
    pub summary: Arc<dyn SummaryProducer>,
    pub index: Arc<dyn IndexProducer>,
}
