//! Reconciliation engine: drains a lab's dirty-path set into durable object
//! storage with bounded parallelism.
//!
//! Failure policy, per entry kind:
//! - storage deletes are soft — a failure is logged, the entry stays dirty,
//!   and the rest of the batch proceeds;
//! - a vanished local file on an edit is a benign race with a later delete
//!   and counts as applied;
//! - an upload failure is batch-fatal — the shared cancel flag stops
//!   undispatched work while in-flight tasks run to completion.
//!
//! The engine never mutates the dirty set. It reports which paths were
//! applied; advancing the checkpoint via [`DirtyTracker::take_clean`] is the
//! caller's move.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::errors::{RegistryError, SyncError};
use crate::models::DirtyAction;
use crate::registry::RegistryStore;
use crate::tracker::DirtyTracker;
use crate::workspace::Workspace;

/// Key-addressed durable storage. Keys are `/`-separated and rooted at the
/// lab instance's code link.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// Remove every object under `prefix`. Used when a lab's data is deleted
    /// outright.
    async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<()>;

    /// Copy every object under `from` to the same relative keys under `to`.
    /// Used to provision quest boilerplate into a new lab's prefix.
    async fn copy_prefix(&self, from: &str, to: &str) -> anyhow::Result<()>;
}

/// Directory-backed object store. Used when the durable store is a mounted
/// checkpoint volume, and as the test backend.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.object_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deleting an absent object is a no-op, mirroring S3 semantics.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<()> {
        let path = self.object_path(prefix);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy_prefix(&self, from: &str, to: &str) -> anyhow::Result<()> {
        let src = self.object_path(from);
        let dst = self.object_path(to);
        tokio::task::spawn_blocking(move || copy_tree(&src, &dst)).await??;
        Ok(())
    }
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src).unwrap_or(Path::new(""));
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Outcome of one reconciliation batch.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Paths whose latest action reached durable storage (or needed nothing).
    pub applied: Vec<String>,
    /// Storage deletes that failed; their entries stay dirty for re-sync.
    pub soft_failures: usize,
    /// First batch-fatal failure observed, if any. Undispatched entries were
    /// abandoned once this was set.
    pub fatal: Option<SyncError>,
}

enum TaskOutcome {
    Applied(String),
    SoftFailed,
    Fatal(SyncError),
}

pub struct ReconcileEngine {
    workspace: Arc<Workspace>,
    registry: Arc<dyn RegistryStore>,
    store: Arc<dyn ObjectStore>,
    worker_cap: usize,
}

impl ReconcileEngine {
    pub fn new(
        workspace: Arc<Workspace>,
        registry: Arc<dyn RegistryStore>,
        store: Arc<dyn ObjectStore>,
        worker_cap: usize,
    ) -> Self {
        Self {
            workspace,
            registry,
            store,
            worker_cap: worker_cap.max(1),
        }
    }

    /// Drain a snapshot of the lab's dirty set into durable storage.
    ///
    /// Blocks until every dispatched task settles. Entries recorded after
    /// the snapshot are untouched.
    pub async fn sync(&self, lab_id: &str) -> Result<SyncReport, RegistryError> {
        let lab = self
            .registry
            .get(lab_id)
            .await?
            .ok_or_else(|| RegistryError::InstanceNotFound { lab_id: lab_id.to_string() })?;
        let snapshot = lab.dirty.clone();
        let prefix = lab.code_link.trim_end_matches('/').to_string();

        info!(lab_id, entries = snapshot.len(), "starting reconciliation");

        let semaphore = Arc::new(Semaphore::new(self.worker_cap));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

        for entry in snapshot {
            if cancelled.load(Ordering::Acquire) {
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            // A fatal failure may have landed while we waited for a slot.
            if cancelled.load(Ordering::Acquire) {
                break;
            }

            let key = format!("{prefix}/{}", entry.path);
            let store = self.store.clone();
            let workspace = self.workspace.clone();
            let cancelled = cancelled.clone();

            tasks.spawn(async move {
                let _permit = permit;
                match entry.action {
                    DirtyAction::Delete => match store.delete_object(&key).await {
                        Ok(()) => {
                            info!(key, "synced (deleted)");
                            TaskOutcome::Applied(entry.path)
                        }
                        Err(e) => {
                            warn!(key, error = %e, "storage delete failed; entry stays dirty");
                            TaskOutcome::SoftFailed
                        }
                    },
                    DirtyAction::Edit => {
                        let local = match workspace.resolve(&entry.path) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(path = entry.path, error = %e, "skipping unresolvable path");
                                return TaskOutcome::SoftFailed;
                            }
                        };
                        let content = match tokio::fs::read(&local).await {
                            Ok(c) => c,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                                // Deleted locally after the edit was recorded;
                                // nothing left to upload.
                                info!(path = entry.path, "local file gone, skipping upload");
                                return TaskOutcome::Applied(entry.path);
                            }
                            Err(e) => {
                                cancelled.store(true, Ordering::Release);
                                return TaskOutcome::Fatal(SyncError::Upload {
                                    key,
                                    source: e.into(),
                                });
                            }
                        };
                        match store.put_object(&key, content).await {
                            Ok(()) => {
                                info!(key, "synced (uploaded)");
                                TaskOutcome::Applied(entry.path)
                            }
                            Err(e) => {
                                cancelled.store(true, Ordering::Release);
                                TaskOutcome::Fatal(SyncError::Upload { key, source: e })
                            }
                        }
                    }
                }
            });
        }

        let mut report = SyncReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Applied(path)) => report.applied.push(path),
                Ok(TaskOutcome::SoftFailed) => report.soft_failures += 1,
                Ok(TaskOutcome::Fatal(err)) => {
                    if report.fatal.is_none() {
                        report.fatal = Some(err);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "reconcile task panicked");
                    if report.fatal.is_none() {
                        report.fatal = Some(SyncError::TaskPanicked);
                    }
                }
            }
        }

        info!(
            lab_id,
            applied = report.applied.len(),
            soft_failures = report.soft_failures,
            fatal = report.fatal.is_some(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Run a batch and advance the checkpoint for everything that applied.
    pub async fn sync_and_clean(
        &self,
        lab_id: &str,
        tracker: &DirtyTracker,
    ) -> Result<SyncReport, RegistryError> {
        let report = self.sync(lab_id).await?;
        if !report.applied.is_empty() {
            tracker.take_clean(lab_id, report.applied.clone()).await?;
        }
        Ok(report)
    }
}
