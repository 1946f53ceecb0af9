//! Seek index (BIF) generation from the primary artifact.
//!
//! Frames are sampled with ffmpeg at a fixed interval, then packed into the
//! BIF container: magic, version, frame count, timestamp multiplier, a
//! reserved block up to byte 64, an offset table terminated by a sentinel
//! entry, and the concatenated JPEG data.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::IndexProducer;
use super::audio::{remove_partial, stderr_tail};
use crate::utils::fs;
use crate::{Error, Result};

const BIF_MAGIC: [u8; 8] = [0x89, 0x42, 0x49, 0x46, 0x0d, 0x0a, 0x1a, 0x0a];
const BIF_HEADER_LEN: usize = 64;

const DEFAULT_FRAME_INTERVAL_SECS: u32 = 10;
const DEFAULT_FRAME_WIDTH: u32 = 320;

/// Produces a BIF thumbnail index file from the primary artifact.
pub struct FfmpegIndexProducer {
    ffmpeg: PathBuf,
    frame_interval_secs: u32,
    frame_width: u32,
}

impl FfmpegIndexProducer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            frame_interval_secs: DEFAULT_FRAME_INTERVAL_SECS,
            frame_width: DEFAULT_FRAME_WIDTH,
        }
    }

    pub fn with_frame_interval_secs(mut self, secs: u32) -> Self {
        self.frame_interval_secs = secs.max(1);
        self
    }

    async fn extract_frames(&self, primary_path: &Path, frames_dir: &Path) -> Result<Vec<Vec<u8>>> {
        fs::ensure_dir_all(frames_dir).await?;

        let filter = format!(
            "fps=1/{},scale={}:-1",
            self.frame_interval_secs, self.frame_width
        );
        let result = Command::new(&self.ffmpeg)
            .arg("-i")
            .arg(primary_path)
            .args(["-vf", &filter, "-q:v", "5"])
            .arg(frames_dir.join("%08d.jpg"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::producer("index", format!("failed to run ffmpeg: {e}")))?;

        if !result.status.success() {
            return Err(Error::producer(
                "index",
                format!(
                    "ffmpeg exited with {}: {}",
                    result.status,
                    stderr_tail(&result.stderr)
                ),
            ));
        }

        // %08d numbering makes lexicographic order the frame order.
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(frames_dir)
            .await
            .map_err(|e| Error::io_path("read_dir", frames_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_path("read_dir", frames_dir, e))?
        {
            if entry.path().extension().is_some_and(|e| e == "jpg") {
                names.push(entry.path());
            }
        }
        names.sort();

        let mut frames = Vec::with_capacity(names.len());
        for name in names {
            let bytes = tokio::fs::read(&name)
                .await
                .map_err(|e| Error::io_path("read", &name, e))?;
            frames.push(bytes);
        }
        Ok(frames)
    }
}

impl Default for FfmpegIndexProducer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl IndexProducer for FfmpegIndexProducer {
    async fn produce(&self, primary_path: &Path, output: &Path) -> Result<()> {
        if !tokio::fs::try_exists(primary_path).await.unwrap_or(false) {
            return Err(Error::producer(
                "index",
                format!("primary file missing: {}", primary_path.display()),
            ));
        }
        fs::ensure_parent_dir(output).await?;

        let frames_dir = output.with_extension("bif.frames");
        debug!(input = %primary_path.display(), "Sampling frames for seek index");

        let produced = async {
            let frames = self.extract_frames(primary_path, &frames_dir).await?;
            if frames.is_empty() {
                return Err(Error::producer("index", "no frames extracted"));
            }
            let interval_ms = self.frame_interval_secs * 1000;
            let bif = build_bif(&frames, interval_ms);
            fs::write_atomic(output, &bif).await?;
            Ok(frames.len())
        }
        .await;

        if let Err(e) = tokio::fs::remove_dir_all(&frames_dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %frames_dir.display(), error = %e, "Failed to remove frame directory");
        }

        match produced {
            Ok(count) => {
                info!(output = %output.display(), frames = count, "Seek index written");
                Ok(())
            }
            Err(e) => {
                remove_partial(output).await;
                Err(e)
            }
        }
    }
}

/// Pack sampled frames into a BIF container.
fn build_bif(frames: &[Vec<u8>], timestamp_multiplier_ms: u32) -> Vec<u8> {
    let count = frames.len() as u32;
    // One table entry per frame plus the end sentinel.
    let data_start = BIF_HEADER_LEN as u32 + (count + 1) * 8;

    let mut out = Vec::with_capacity(
        data_start as usize + frames.iter().map(Vec::len).sum::<usize>(),
    );
    out.extend_from_slice(&BIF_MAGIC);
    out.extend_from_slice(&0u32.to_le_bytes()); // version
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&timestamp_multiplier_ms.to_le_bytes());
    out.resize(BIF_HEADER_LEN, 0);

    let mut offset = data_start;
    for (i, frame) in frames.iter().enumerate() {
        out.extend_from_slice(&(i as u32).to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        offset += frame.len() as u32;
    }
    out.extend_from_slice(&u32::MAX.to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes());

    for frame in frames {
        out.extend_from_slice(frame);
    }
    out
}
