//! Shared lab-instance registry.
//!
//! The registry is a document store keyed by lab id. Durability of the store
//! itself is an external concern; what this module pins down is the access
//! contract every backend must honor:
//!
//! - `update` is a per-key atomic read-modify-write. Concurrent dirty-path
//!   upserts from simultaneous filesystem edits must never lose writes.
//! - `create_capped` is an atomic count-then-insert. Concurrent admissions
//!   must never overshoot the ceiling, even transiently.
//!
//! `MemoryRegistry` is the process-local backend: one mutex over the whole
//! map, which trivially satisfies both contracts and doubles as the test
//! backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::RegistryError;
use crate::models::LabInstance;

/// Owned mutation applied under the store's per-key exclusion.
pub type UpdateFn = Box<dyn FnOnce(&mut LabInstance) + Send>;

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Fetch a lab instance document, if present.
    async fn get(&self, lab_id: &str) -> Result<Option<LabInstance>, RegistryError>;

    /// Insert or replace a document unconditionally.
    async fn put(&self, instance: LabInstance) -> Result<(), RegistryError>;

    /// Remove a document. Removing an absent id is not an error: teardown
    /// must be idempotent.
    async fn remove(&self, lab_id: &str) -> Result<(), RegistryError>;

    /// Number of live (non-removed) instances. Every present document counts:
    /// removal is the only terminal action in the lifecycle.
    async fn count_active(&self) -> Result<usize, RegistryError>;

    /// Atomically apply `mutate` to the document for `lab_id` and return the
    /// updated document. Fails with `InstanceNotFound` if absent.
    async fn update(&self, lab_id: &str, mutate: UpdateFn) -> Result<LabInstance, RegistryError>;

    /// Atomically insert `instance` unless the active count has reached
    /// `ceiling`. Re-registering an existing lab id replaces the document
    /// without consuming a new slot.
    async fn create_capped(
        &self,
        instance: LabInstance,
        ceiling: usize,
    ) -> Result<(), RegistryError>;
}

/// In-memory registry backend.
#[derive(Default)]
pub struct MemoryRegistry {
    labs: Mutex<HashMap<String, LabInstance>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn get(&self, lab_id: &str) -> Result<Option<LabInstance>, RegistryError> {
        let labs = self.labs.lock().expect("registry lock poisoned");
        Ok(labs.get(lab_id).cloned())
    }

    async fn put(&self, instance: LabInstance) -> Result<(), RegistryError> {
        let mut labs = self.labs.lock().expect("registry lock poisoned");
        labs.insert(instance.lab_id.clone(), instance);
        Ok(())
    }

    async fn remove(&self, lab_id: &str) -> Result<(), RegistryError> {
        let mut labs = self.labs.lock().expect("registry lock poisoned");
        labs.remove(lab_id);
        Ok(())
    }

    async fn count_active(&self) -> Result<usize, RegistryError> {
        let labs = self.labs.lock().expect("registry lock poisoned");
        Ok(labs.len())
    }

    async fn update(&self, lab_id: &str, mutate: UpdateFn) -> Result<LabInstance, RegistryError> {
        let mut labs = self.labs.lock().expect("registry lock poisoned");
        let instance = labs
            .get_mut(lab_id)
            .ok_or_else(|| RegistryError::InstanceNotFound { lab_id: lab_id.to_string() })?;
        mutate(instance);
        Ok(instance.clone())
    }

    async fn create_capped(
        &self,
        instance: LabInstance,
        ceiling: usize,
    ) -> Result<(), RegistryError> {
        let mut labs = self.labs.lock().expect("registry lock poisoned");
        if !labs.contains_key(&instance.lab_id) {
            let active = labs.len();
            if active >= ceiling {
                return Err(RegistryError::Capacity { active, ceiling });
            }
        }
        labs.insert(instance.lab_id.clone(), instance);
        Ok(())
    }
}
