//! Audio extraction via ffmpeg.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::SecondaryProducer;
use crate::utils::fs;
use crate::{Error, Result};

/// Extracts the audio track of the primary artifact into an mp3 file.
pub struct FfmpegSecondaryProducer {
    ffmpeg: PathBuf,
}

impl FfmpegSecondaryProducer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl Default for FfmpegSecondaryProducer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl SecondaryProducer for FfmpegSecondaryProducer {
    async fn produce(&self, primary_path: &Path, output: &Path) -> Result<()> {
        if !tokio::fs::try_exists(primary_path).await.unwrap_or(false) {
            return Err(Error::producer(
                "secondary",
                format!("primary file missing: {}", primary_path.display()),
            ));
        }
        fs::ensure_parent_dir(output).await?;

        debug!(input = %primary_path.display(), output = %output.display(), "Extracting audio");
        let result = Command::new(&self.ffmpeg)
            .arg("-i")
            .arg(primary_path)
            .args(["-vn", "-acodec", "libmp3lame", "-ab", "192k", "-ar", "44100", "-y"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::producer("secondary", format!("failed to run ffmpeg: {e}")))?;

        if !result.status.success() {
            remove_partial(output).await;
            return Err(Error::producer(
                "secondary",
                format!(
                    "ffmpeg exited with {}: {}",
                    result.status,
                    stderr_tail(&result.stderr)
                ),
            ));
        }

        info!(output = %output.display(), "Audio extraction finished");
        Ok(())
    }
}

/// Last part of ffmpeg's stderr, where the actual error lands.
pub(super) fn stderr_tail(stderr: &[u8]) -> String {
    const TAIL_LEN: usize = 200;
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(TAIL_LEN - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[start..].to_string()
}

pub(super) async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove partial output");
    }
}
