//! On-disk layout of derived artifacts.
//!
//! Every media item gets one directory under the download root, named after
//! the sanitized title, with fixed per-kind file names inside it. Polling
//! clients address artifacts by the path relative to the root, so both forms
//! are exposed here.

use std::path::{Path, PathBuf};

use crate::task::ResourceKind;
use crate::utils::filename::sanitize_title;

/// Resolves artifact paths under a fixed download root.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all artifacts for one media item.
    pub fn media_dir(&self, title: &str, media_id: &str) -> PathBuf {
        let mut safe = sanitize_title(title);
        if safe == "untitled" {
            // Keep distinct items distinct even with unusable titles.
            safe = format!("untitled_{media_id}");
        }
        self.root.join(safe)
    }

    /// Absolute path of one artifact.
    pub fn artifact_path(&self, kind: ResourceKind, title: &str, media_id: &str) -> PathBuf {
        self.media_dir(title, media_id).join(artifact_file_name(kind, media_id))
    }

    /// Path of one artifact relative to the download root.
    pub fn relative_path(&self, kind: ResourceKind, title: &str, media_id: &str) -> PathBuf {
        self.artifact_path(kind, title, media_id)
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.artifact_path(kind, title, media_id))
    }
}

/// File name of one artifact within its media directory.
fn artifact_file_name(kind: ResourceKind, media_id: &str) -> String {
    match kind {
        ResourceKind::Primary => format!("{media_id}.mp4"),
        ResourceKind::Secondary => format!("{media_id}.mp3"),
        ResourceKind::Transcript => format!("{media_id}.srt"),
        ResourceKind::Summary => format!("{media_id}_summary.json"),
        ResourceKind::Index => format!("{media_id}.bif"),
    }
}
