//! Durable task store.
//!
//! All task state lives in one JSON document mapping task id → snapshot,
//! mirrored in memory behind a single mutex. Every mutation rewrites the
//! document via write-to-temp-then-atomic-rename, so a crash mid-write never
//! corrupts the durable copy. An unreadable document at load time is renamed
//! aside as a timestamped backup and an empty store is used: losing history
//! is accepted, refusing to start is not.
//!
//! Persistence failures after a successful in-memory mutation are logged and
//! swallowed; callers never see them. Reads are point reads of the current
//! snapshot and never block on pipeline progress beyond the brief lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::task::{TaskSnapshot, TaskUpdate};
use crate::utils::fs;

type TaskMap = BTreeMap<String, TaskSnapshot>;

/// Persistent key-value store for task snapshots.
pub struct TaskStore {
    path: PathBuf,
    tasks: Mutex<TaskMap>,
}

impl TaskStore {
    /// Open the store, loading the persisted document if present.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tasks = load_document(&path).await;
        info!(path = %path.display(), tasks = tasks.len(), "Task store opened");
        Self {
            path,
            tasks: Mutex::new(tasks),
        }
    }

    /// Insert a new task record.
    ///
    /// Returns `false` (and logs) if a record with this id already exists;
    /// an existing record is never silently overwritten. Resubmissions are
    /// expected to use a fresh task id instead.
    pub async fn create(&self, snapshot: TaskSnapshot) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&snapshot.task_id) {
            warn!(task_id = %snapshot.task_id, "Refusing to overwrite existing task record");
            return false;
        }
        tasks.insert(snapshot.task_id.clone(), snapshot);
        self.persist(&tasks).await;
        true
    }

    /// Fetch the current snapshot for one task.
    pub async fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks.lock().await.get(task_id).cloned()
    }

    /// Merge a partial update into an existing task.
    ///
    /// Top-level fields are replaced; the `resource_status` sub-map is merged
    /// key-by-key (see [`TaskSnapshot::apply`]). Returns `false` if the task
    /// does not exist.
    pub async fn update(&self, task_id: &str, update: TaskUpdate) -> bool {
        let mut tasks = self.tasks.lock().await;
        let Some(snapshot) = tasks.get_mut(task_id) else {
            warn!(task_id = %task_id, "Ignoring update for unknown task");
            return false;
        };
        snapshot.apply(update);
        self.persist(&tasks).await;
        true
    }

    /// Remove a task record. Returns `false` if it was not present.
    pub async fn remove(&self, task_id: &str) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.remove(task_id).is_none() {
            return false;
        }
        self.persist(&tasks).await;
        true
    }

    /// All tasks whose overall status is not terminal.
    pub async fn list_active(&self) -> Vec<TaskSnapshot> {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|t| !t.overall_status.is_terminal())
            .cloned()
            .collect()
    }

    /// All persisted task snapshots.
    pub async fn list_all(&self) -> Vec<TaskSnapshot> {
        self.tasks.lock().await.values().cloned().collect()
    }

    /// Write the document while holding the map lock.
    ///
    /// A failed write is logged and otherwise a no-op: the in-memory state
    /// stays authoritative and the next successful persist catches up.
    async fn persist(&self, tasks: &TaskMap) {
        let contents = match serde_json::to_vec_pretty(tasks) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Failed to serialize task document");
                return;
            }
        };
        if let Err(e) = fs::write_atomic(&self.path, &contents).await {
            error!(path = %self.path.display(), error = %e, "Failed to persist task document");
        }
    }
}

/// Load the persisted document, backing up an unreadable one.
async fn load_document(path: &Path) -> TaskMap {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No task document yet, starting empty");
            return TaskMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read task document");
            back_up_corrupt(path).await;
            return TaskMap::new();
        }
    };

    match serde_json::from_slice::<TaskMap>(&bytes) {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Task document is malformed");
            back_up_corrupt(path).await;
            TaskMap::new()
        }
    }
}

async fn back_up_corrupt(path: &Path) {
    let backup = path.with_extension(format!("json.{}.bak", Utc::now().timestamp()));
    match tokio::fs::rename(path, &backup).await {
        Ok(()) => info!(backup = %backup.display(), "Backed up unreadable task document"),
        Err(e) => error!(path = %path.display(), error = %e, "Failed to back up task document"),
    }
}
