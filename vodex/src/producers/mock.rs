//! Scripted producers for pipeline tests.
//!
//! Each mock counts invocations so tests can assert that a stage's producer
//! was (or was not) called, and the transcript mock follows a per-attempt
//! script to exercise the retry path.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AiConfig, IndexProducer, MetadataProducer, PrimaryProducer, Producers, SecondaryProducer,
    SummaryProducer, TranscriptProducer,
};
use crate::config::Credentials;
use crate::task::{MediaMetadata, ResourceSelection};
use crate::{Error, Result};

/// One scripted attempt outcome.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    /// Report success without writing the output file, mimicking an external
    /// agent that acknowledged the job but never delivered.
    SucceedWithoutFile,
    Fail(String),
    /// Sleep for the duration, then fail. Used to trip attempt and overall
    /// timeouts; an aborted attempt never observes the failure.
    Hang(Duration),
}

pub struct MockMetadataProducer {
    metadata: MediaMetadata,
    fail: bool,
    calls: AtomicUsize,
}

impl MockMetadataProducer {
    pub fn succeeding(metadata: MediaMetadata) -> Self {
        Self {
            metadata,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            metadata: MediaMetadata::default(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProducer for MockMetadataProducer {
    async fn fetch(&self, media_id: &str, _credentials: &Credentials) -> Result<MediaMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::metadata(format!("no such media: {media_id}")));
        }
        let mut metadata = self.metadata.clone();
        metadata.media_id = media_id.to_string();
        Ok(metadata)
    }
}

pub struct MockPrimaryProducer {
    fail: bool,
    panic: bool,
    calls: AtomicUsize,
}

impl MockPrimaryProducer {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            panic: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            panic: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Panics on every invocation, for exercising the worker's join-error
    /// handling.
    pub fn panicking() -> Self {
        Self {
            fail: false,
            panic: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrimaryProducer for MockPrimaryProducer {
    async fn produce(
        &self,
        _metadata: &MediaMetadata,
        _options: &ResourceSelection,
        _credentials: &Credentials,
        output: &Path,
    ) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("scripted primary panic");
        }
        if self.fail {
            return Err(Error::producer("primary", "scripted primary failure"));
        }
        tokio::fs::write(output, b"primary")
            .await
            .map_err(|e| Error::io_path("write", output, e))?;
        Ok(output.to_path_buf())
    }
}

pub struct MockSecondaryProducer {
    fail: bool,
    calls: AtomicUsize,
}

impl MockSecondaryProducer {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecondaryProducer for MockSecondaryProducer {
    async fn produce(&self, _primary_path: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::producer("secondary", "scripted secondary failure"));
        }
        tokio::fs::write(output, b"secondary")
            .await
            .map_err(|e| Error::io_path("write", output, e))
    }
}

pub struct MockTranscriptProducer {
    script: Mutex<VecDeque<MockBehavior>>,
    calls: AtomicUsize,
}

impl MockTranscriptProducer {
    /// Runs the scripted behaviors in order; once the script is exhausted
    /// every further attempt succeeds.
    pub fn scripted(script: Vec<MockBehavior>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptProducer for MockTranscriptProducer {
    async fn produce(
        &self,
        _metadata: &MediaMetadata,
        _credentials: &Credentials,
        output: &Path,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(MockBehavior::Succeed);
        match behavior {
            MockBehavior::Succeed => tokio::fs::write(output, b"1\n00:00:00,000 --> 00:00:01,000\nhi\n")
                .await
                .map_err(|e| Error::io_path("write", output, e)),
            MockBehavior::SucceedWithoutFile => Ok(()),
            MockBehavior::Fail(reason) => Err(Error::producer("transcript", reason)),
            MockBehavior::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Err(Error::producer("transcript", "gave up after hang"))
            }
        }
    }
}

pub struct MockSummaryProducer {
    fail: bool,
    calls: AtomicUsize,
}

impl MockSummaryProducer {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryProducer for MockSummaryProducer {
    async fn produce(&self, _transcript_path: &Path, _ai: &AiConfig) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::producer("summary", "scripted summary failure"));
        }
        Ok(r#"{"summary":"a short recap"}"#.to_string())
    }
}

pub struct MockIndexProducer {
    fail: bool,
    calls: AtomicUsize,
}

impl MockIndexProducer {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexProducer for MockIndexProducer {
    async fn produce(&self, _primary_path: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::producer("index", "scripted index failure"));
        }
        tokio::fs::write(output, b"index")
            .await
            .map_err(|e| Error::io_path("write", output, e))
    }
}

/// A full producer set with handles kept for assertions.
pub struct MockSet {
    pub metadata: Arc<MockMetadataProducer>,
    pub primary: Arc<MockPrimaryProducer>,
    pub secondary: Arc<MockSecondaryProducer>,
    pub transcript: Arc<MockTranscriptProducer>,
    pub summary: Arc<MockSummaryProducer>,
    pub index: Arc<MockIndexProducer>,
}

impl MockSet {
    /// Everything succeeds, with a plain metadata record.
    pub fn all_succeeding() -> Self {
        let metadata = MediaMetadata {
            title: "Test Media".to_string(),
            owner: "tester".to_string(),
            duration_secs: 60,
            ..Default::default()
        };
        Self {
            metadata: Arc::new(MockMetadataProducer::succeeding(metadata)),
            primary: Arc::new(MockPrimaryProducer::succeeding()),
            secondary: Arc::new(MockSecondaryProducer::succeeding()),
            transcript: Arc::new(MockTranscriptProducer::succeeding()),
            summary: Arc::new(MockSummaryProducer::succeeding()),
            index: Arc::new(MockIndexProducer::succeeding()),
        }
    }

    pub fn with_failing_metadata(mut self) -> Self {
        self.metadata = Arc::new(MockMetadataProducer::failing());
        self
    }

    pub fn with_failing_primary(mut self) -> Self {
        self.primary = Arc::new(MockPrimaryProducer::failing());
        self
    }

    pub fn with_panicking_primary(mut self) -> Self {
        self.primary = Arc::new(MockPrimaryProducer::panicking());
        self
    }

    pub fn with_failing_secondary(mut self) -> Self {
        self.secondary = Arc::new(MockSecondaryProducer::failing());
        self
    }

    pub fn with_failing_summary(mut self) -> Self {
        self.summary = Arc::new(MockSummaryProducer::failing());
        self
    }

    pub fn with_transcript_script(mut self, script: Vec<MockBehavior>) -> Self {
        self.transcript = Arc::new(MockTranscriptProducer::scripted(script));
        self
    }

    pub fn producers(&self) -> Producers {
        Producers {
            metadata: self.metadata.clone(),
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            transcript: self.transcript.clone(),
            summary: self.summary.clone(),
            index: self.index.clone(),
        }
    }
}
