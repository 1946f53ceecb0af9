//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and a
//! write-to-temp-then-rename primitive used by the task store and the
//! summary stage so a crash mid-write never leaves a truncated file behind.

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error("creating directory", path, e))
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    ensure_dir_all(parent).await
}

/// Ensure a directory exists (synchronous variant).
pub fn ensure_dir_all_sync(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error("creating directory", path, e))
}

/// Atomically replace `path` with `contents`.
///
/// Writes to a sibling `.tmp` file first and renames it over the target, so
/// readers either see the old complete document or the new one, never a
/// partial write. The temp file is removed on write failure.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path).await?;

    let tmp = path.with_extension("tmp");
    if let Err(e) = tokio::fs::write(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error("writing temp file", &tmp, e));
    }

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error("renaming temp file", path, e))
}
