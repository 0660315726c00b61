//! Dirty-state tracker: records the effect of each workspace mutation into
//! the registry's dirty-path set.
//!
//! Every method routes through `RegistryStore::update`, so the read-modify-
//! write happens under the store's per-key exclusion and racing filesystem
//! operations on the same instance cannot lose entries.
//!
//! Paths are workspace-relative; translation to durable-storage keys is the
//! reconciliation engine's job.

use std::sync::Arc;

use crate::errors::RegistryError;
use crate::models::{DirtyAction, DirtyFileEntry, LabInstance, ProgressEntry};
use crate::registry::RegistryStore;

#[derive(Clone)]
pub struct DirtyTracker {
    registry: Arc<dyn RegistryStore>,
}

fn upsert(dirty: &mut Vec<DirtyFileEntry>, path: &str, action: DirtyAction) {
    if let Some(entry) = dirty.iter_mut().find(|e| e.path == path) {
        entry.action = action;
    } else {
        dirty.push(DirtyFileEntry { path: path.to_string(), action });
    }
}

impl DirtyTracker {
    pub fn new(registry: Arc<dyn RegistryStore>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn RegistryStore> {
        &self.registry
    }

    /// Record that `path` holds content not yet reconciled. Supersedes any
    /// prior entry for the same path.
    pub async fn record_edit(&self, lab_id: &str, path: &str) -> Result<(), RegistryError> {
        let path = path.to_string();
        self.registry
            .update(lab_id, Box::new(move |lab| upsert(&mut lab.dirty, &path, DirtyAction::Edit)))
            .await?;
        Ok(())
    }

    /// Record that `path` was removed locally. Supersedes any prior entry.
    pub async fn record_delete(&self, lab_id: &str, path: &str) -> Result<(), RegistryError> {
        let path = path.to_string();
        self.registry
            .update(
                lab_id,
                Box::new(move |lab| upsert(&mut lab.dirty, &path, DirtyAction::Delete)),
            )
            .await?;
        Ok(())
    }

    /// Re-key after a rename: drop whatever was recorded under `old_path`
    /// and record an edit under `new_path`. Never leaves a stale entry under
    /// the old key.
    pub async fn record_rename(
        &self,
        lab_id: &str,
        old_path: &str,
        new_path: &str,
    ) -> Result<(), RegistryError> {
        let old_path = old_path.to_string();
        let new_path = new_path.to_string();
        self.registry
            .update(
                lab_id,
                Box::new(move |lab| {
                    lab.dirty.retain(|e| e.path != old_path);
                    upsert(&mut lab.dirty, &new_path, DirtyAction::Edit);
                }),
            )
            .await?;
        Ok(())
    }

    /// Append a progress-log entry. Side effect: the instance's status and
    /// `last_updated_at` follow the entry.
    pub async fn append_progress(
        &self,
        lab_id: &str,
        entry: ProgressEntry,
    ) -> Result<LabInstance, RegistryError> {
        self.registry
            .update(
                lab_id,
                Box::new(move |lab| {
                    lab.status = entry.status;
                    lab.last_updated_at = entry.timestamp;
                    lab.progress.push(entry);
                }),
            )
            .await
    }

    /// Snapshot the current dirty set without holding any lock across I/O.
    pub async fn snapshot(&self, lab_id: &str) -> Result<Vec<DirtyFileEntry>, RegistryError> {
        let lab = self
            .registry
            .get(lab_id)
            .await?
            .ok_or_else(|| RegistryError::InstanceNotFound { lab_id: lab_id.to_string() })?;
        Ok(lab.dirty)
    }

    /// Advance the synced checkpoint: drop exactly the entries whose paths
    /// were successfully applied to durable storage. Entries recorded after
    /// the sync snapshot are untouched and will be picked up next time.
    pub async fn take_clean(
        &self,
        lab_id: &str,
        applied: Vec<String>,
    ) -> Result<(), RegistryError> {
        self.registry
            .update(
                lab_id,
                Box::new(move |lab| lab.dirty.retain(|e| !applied.contains(&e.path))),
            )
            .await?;
        Ok(())
    }
}
