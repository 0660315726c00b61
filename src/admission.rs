//! Admission controller: the only path by which lab instances come into
//! existence or leave it.
//!
//! Ordering is load-bearing. The capped registry insert happens before any
//! orchestrator call, so a request rejected for capacity leaves no record
//! behind and never touches the cluster. Once the record exists, orchestrator
//! outcomes are written back into its progress log.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::QuestCatalog;
use crate::errors::AdmissionError;
use crate::models::{LabInstance, LabStatus, ProgressEntry, ServiceOrigin};
use crate::orchestrator::{Orchestrator, SpinUpParams};
use crate::registry::RegistryStore;
use crate::sync::ObjectStore;

/// Request to start a freeform playground sandbox.
#[derive(Debug, Clone)]
pub struct PlaygroundRequest {
    pub language: String,
    pub lab_id: String,
    pub user_id: Option<String>,
}

/// Request to start a quest-backed sandbox.
#[derive(Debug, Clone)]
pub struct QuestRequest {
    pub language: String,
    pub quest_slug: String,
    pub user_id: String,
    /// Empty means "mint one".
    pub lab_id: String,
}

pub struct AdmissionController {
    registry: Arc<dyn RegistryStore>,
    orchestrator: Arc<dyn Orchestrator>,
    catalog: Arc<dyn QuestCatalog>,
    store: Arc<dyn ObjectStore>,
    /// Ceiling on concurrently active lab instances.
    ceiling: usize,
    namespace: String,
}

impl AdmissionController {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        orchestrator: Arc<dyn Orchestrator>,
        catalog: Arc<dyn QuestCatalog>,
        store: Arc<dyn ObjectStore>,
        ceiling: usize,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            catalog,
            store,
            ceiling,
            namespace: namespace.into(),
        }
    }

    /// Admit a playground lab: validate, claim a slot, then schedule the pod.
    pub async fn start_playground(
        &self,
        req: PlaygroundRequest,
    ) -> Result<LabInstance, AdmissionError> {
        if req.language.is_empty() {
            return Err(AdmissionError::Validation("language is required".into()));
        }
        if req.lab_id.is_empty() {
            return Err(AdmissionError::Validation("labId is required".into()));
        }

        let user_id = req.user_id.filter(|u| !u.is_empty());
        if let Some(user) = &user_id {
            self.catalog
                .validate_user_limits(user)
                .await
                .map_err(|e| AdmissionError::UserLimit(e.to_string()))?;
        }

        let code_link = match &user_id {
            Some(user) => format!("code/{user}/playgrounds/{}/{}", req.language, req.lab_id),
            None => format!("code/{}/{}", req.language, req.lab_id),
        };
        let instance = LabInstance::new(&req.lab_id, &req.language, user_id, code_link);
        self.admit(instance, None).await
    }

    /// Admit a quest lab: resolve the quest, claim a slot, schedule the pod.
    pub async fn start_quest(&self, req: QuestRequest) -> Result<LabInstance, AdmissionError> {
        if req.language.is_empty() {
            return Err(AdmissionError::Validation("language is required".into()));
        }
        if req.user_id.is_empty() {
            return Err(AdmissionError::Validation("userId is required".into()));
        }
        if req.quest_slug.is_empty() {
            return Err(AdmissionError::Validation("questSlug is required".into()));
        }

        self.catalog
            .validate_user_limits(&req.user_id)
            .await
            .map_err(|e| AdmissionError::UserLimit(e.to_string()))?;

        let quest = self
            .catalog
            .quest_by_slug(&req.quest_slug)
            .await?
            .ok_or_else(|| AdmissionError::QuestNotFound { slug: req.quest_slug.clone() })?;
        if quest.language != req.language {
            return Err(AdmissionError::Validation(format!(
                "quest {} is a {} quest, not {}",
                quest.slug, quest.language, req.language
            )));
        }

        let lab_id = if req.lab_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            req.lab_id
        };
        let code_link = format!(
            "code/{}/projects/{}/{}/{lab_id}",
            req.user_id, req.language, quest.slug
        );
        let instance =
            LabInstance::new(&lab_id, &req.language, Some(req.user_id), code_link);
        self.admit(instance, Some(quest.boilerplate_code)).await
    }

    /// Claim a registry slot under the ceiling, provision boilerplate if any,
    /// then ask the orchestrator for a pod. Capacity rejection happens before
    /// storage or the orchestrator are involved.
    async fn admit(
        &self,
        instance: LabInstance,
        boilerplate: Option<String>,
    ) -> Result<LabInstance, AdmissionError> {
        let lab_id = instance.lab_id.clone();
        let params = SpinUpParams {
            lab_id: lab_id.clone(),
            language: instance.language.clone(),
            code_link: instance.code_link.clone(),
            namespace: self.namespace.clone(),
        };

        self.registry.create_capped(instance, self.ceiling).await?;
        info!(lab_id, "lab admitted");

        if let Some(src) = boilerplate {
            if let Err(e) = self.store.copy_prefix(&src, &params.code_link).await {
                error!(lab_id, error = %e, "boilerplate provisioning failed");
                self.record_failure(&lab_id, format!("Boilerplate provisioning failed: {e}"))
                    .await;
                return Err(AdmissionError::Other(e));
            }
        }

        match self.orchestrator.spin_up(&params).await {
            Ok(()) => {
                let updated = self
                    .registry
                    .update(
                        &lab_id,
                        Box::new(|lab| {
                            lab.status = LabStatus::Booting;
                            lab.last_updated_at = chrono::Utc::now().timestamp();
                            lab.progress.push(ProgressEntry::now(
                                LabStatus::Booting,
                                "Sandbox pod requested",
                                ServiceOrigin::Gateway,
                            ));
                        }),
                    )
                    .await?;
                Ok(updated)
            }
            Err(e) => {
                error!(lab_id, error = %e, "orchestrator spin-up failed");
                self.record_failure(&lab_id, format!("Sandbox pod request failed: {e}"))
                    .await;
                Err(AdmissionError::Orchestrator(e))
            }
        }
    }

    /// Best-effort: leave the record behind in Error state so the failure is
    /// visible to status queries.
    async fn record_failure(&self, lab_id: &str, message: String) {
        if let Err(update_err) = self
            .registry
            .update(
                lab_id,
                Box::new(move |lab| {
                    lab.status = LabStatus::Error;
                    lab.last_updated_at = chrono::Utc::now().timestamp();
                    lab.progress.push(ProgressEntry::now(
                        LabStatus::Error,
                        message,
                        ServiceOrigin::Gateway,
                    ));
                }),
            )
            .await
        {
            warn!(lab_id, error = %update_err, "failed to record admission failure");
        }
    }

    /// Tear down a lab's pod and drop its registry record. The workspace
    /// content already reconciled to durable storage is kept.
    pub async fn end_lab(&self, lab_id: &str) -> Result<LabInstance, AdmissionError> {
        let instance = self
            .registry
            .get(lab_id)
            .await?
            .ok_or_else(|| AdmissionError::LabNotFound { lab_id: lab_id.to_string() })?;

        self.orchestrator
            .tear_down(lab_id, &instance.language, &self.namespace)
            .await
            .map_err(AdmissionError::Orchestrator)?;
        self.registry.remove(lab_id).await?;
        info!(lab_id, "lab ended");
        Ok(instance)
    }

    /// Like [`end_lab`](Self::end_lab), but also deletes the lab's durable
    /// content. Nothing of the lab survives this call.
    pub async fn delete_lab(&self, lab_id: &str) -> Result<LabInstance, AdmissionError> {
        let instance = self
            .registry
            .get(lab_id)
            .await?
            .ok_or_else(|| AdmissionError::LabNotFound { lab_id: lab_id.to_string() })?;

        self.orchestrator
            .tear_down(lab_id, &instance.language, &self.namespace)
            .await
            .map_err(AdmissionError::Orchestrator)?;
        self.store
            .delete_prefix(instance.code_link.trim_end_matches('/'))
            .await?;
        self.registry.remove(lab_id).await?;
        info!(lab_id, code_link = instance.code_link, "lab deleted");
        Ok(instance)
    }

    /// Current registry document for a lab.
    pub async fn lab_status(&self, lab_id: &str) -> Result<LabInstance, AdmissionError> {
        self.registry
            .get(lab_id)
            .await?
            .ok_or_else(|| AdmissionError::LabNotFound { lab_id: lab_id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Quest, StaticCatalog};
    use crate::registry::MemoryRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeOrchestrator {
        fail_spin_up: AtomicBool,
        spin_ups: AtomicUsize,
        tear_downs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Orchestrator for FakeOrchestrator {
        async fn spin_up(&self, _params: &SpinUpParams) -> anyhow::Result<()> {
            self.spin_ups.fetch_add(1, Ordering::SeqCst);
            if self.fail_spin_up.load(Ordering::SeqCst) {
                anyhow::bail!("image pull backoff");
            }
            Ok(())
        }

        async fn tear_down(
            &self,
            lab_id: &str,
            _language: &str,
            _namespace: &str,
        ) -> anyhow::Result<()> {
            self.tear_downs.lock().unwrap().push(lab_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullStore {
        prefix_deletes: Mutex<Vec<String>>,
        copies: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ObjectStore for NullStore {
        async fn put_object(&self, _key: &str, _bytes: Vec<u8>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_object(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_prefix(&self, prefix: &str) -> anyhow::Result<()> {
            self.prefix_deletes.lock().unwrap().push(prefix.to_string());
            Ok(())
        }
        async fn copy_prefix(&self, from: &str, to: &str) -> anyhow::Result<()> {
            self.copies.lock().unwrap().push((from.to_string(), to.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        registry: Arc<MemoryRegistry>,
        orchestrator: Arc<FakeOrchestrator>,
        store: Arc<NullStore>,
        controller: AdmissionController,
    }

    fn fixture_with(ceiling: usize, quests: Vec<Quest>) -> Fixture {
        let registry = Arc::new(MemoryRegistry::new());
        let orchestrator = Arc::new(FakeOrchestrator::default());
        let store = Arc::new(NullStore::default());
        let controller = AdmissionController::new(
            registry.clone(),
            orchestrator.clone(),
            Arc::new(StaticCatalog::new(quests)),
            store.clone(),
            ceiling,
            "questlab",
        );
        Fixture { registry, orchestrator, store, controller }
    }

    fn fixture(ceiling: usize) -> Fixture {
        fixture_with(ceiling, Vec::new())
    }

    fn playground(lab_id: &str) -> PlaygroundRequest {
        PlaygroundRequest {
            language: "go".into(),
            lab_id: lab_id.into(),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn playground_admission_registers_and_boots() {
        let fx = fixture(5);
        let lab = fx.controller.start_playground(playground("lab-1")).await.unwrap();
        assert_eq!(lab.status, LabStatus::Booting);
        assert_eq!(lab.code_link, "code/go/lab-1");
        assert_eq!(fx.orchestrator.spin_ups.load(Ordering::SeqCst), 1);
        assert_eq!(lab.progress.len(), 1);
        assert_eq!(lab.progress[0].origin, ServiceOrigin::Gateway);
    }

    #[tokio::test]
    async fn playground_code_link_includes_user_when_present() {
        let fx = fixture(5);
        let lab = fx
            .controller
            .start_playground(PlaygroundRequest {
                language: "node".into(),
                lab_id: "lab-9".into(),
                user_id: Some("user-4".into()),
            })
            .await
            .unwrap();
        assert_eq!(lab.code_link, "code/user-4/playgrounds/node/lab-9");
        assert_eq!(lab.user_id.as_deref(), Some("user-4"));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_before_any_side_effect() {
        let fx = fixture(5);
        let err = fx
            .controller
            .start_playground(PlaygroundRequest {
                language: String::new(),
                lab_id: "lab-1".into(),
                user_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Validation(_)));
        assert_eq!(fx.orchestrator.spin_ups.load(Ordering::SeqCst), 0);
        assert_eq!(fx.registry.count_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn capacity_rejection_leaves_no_record_and_no_pod() {
        let fx = fixture(2);
        fx.controller.start_playground(playground("lab-1")).await.unwrap();
        fx.controller.start_playground(playground("lab-2")).await.unwrap();

        let err = fx.controller.start_playground(playground("lab-3")).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Capacity { active: 2, ceiling: 2 }));
        assert!(fx.registry.get("lab-3").await.unwrap().is_none());
        // Only the two admitted labs reached the orchestrator.
        assert_eq!(fx.orchestrator.spin_ups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn spin_up_failure_marks_record_error() {
        let fx = fixture(5);
        fx.orchestrator.fail_spin_up.store(true, Ordering::SeqCst);

        let err = fx.controller.start_playground(playground("lab-1")).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Orchestrator(_)));

        let lab = fx.registry.get("lab-1").await.unwrap().unwrap();
        assert_eq!(lab.status, LabStatus::Error);
        assert!(lab.progress.iter().any(|p| p.status == LabStatus::Error));
    }

    #[tokio::test]
    async fn quest_admission_resolves_catalog_and_mints_lab_id() {
        let fx = fixture_with(
            5,
            vec![Quest {
                slug: "http-server".into(),
                name: "Build an HTTP server".into(),
                language: "go".into(),
                boilerplate_code: "boilerplate/go/http-server".into(),
            }],
        );
        let lab = fx
            .controller
            .start_quest(QuestRequest {
                language: "go".into(),
                quest_slug: "http-server".into(),
                user_id: "user-4".into(),
                lab_id: String::new(),
            })
            .await
            .unwrap();
        assert!(!lab.lab_id.is_empty());
        assert_eq!(
            lab.code_link,
            format!("code/user-4/projects/go/http-server/{}", lab.lab_id)
        );
        assert_eq!(lab.status, LabStatus::Booting);
        // Boilerplate was provisioned into the lab's prefix.
        assert_eq!(
            fx.store.copies.lock().unwrap().as_slice(),
            [("boilerplate/go/http-server".to_string(), lab.code_link.clone())]
        );
    }

    #[tokio::test]
    async fn unknown_quest_is_a_404_shaped_error() {
        let fx = fixture(5);
        let err = fx
            .controller
            .start_quest(QuestRequest {
                language: "go".into(),
                quest_slug: "no-such-quest".into(),
                user_id: "user-4".into(),
                lab_id: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::QuestNotFound { .. }));
        assert_eq!(fx.orchestrator.spin_ups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn end_lab_tears_down_and_frees_the_slot() {
        let fx = fixture(1);
        fx.controller.start_playground(playground("lab-1")).await.unwrap();

        fx.controller.end_lab("lab-1").await.unwrap();
        assert_eq!(fx.orchestrator.tear_downs.lock().unwrap().as_slice(), ["lab-1"]);
        assert!(fx.registry.get("lab-1").await.unwrap().is_none());
        // Ending a lab frees its admission slot.
        fx.controller.start_playground(playground("lab-2")).await.unwrap();
        // Durable content survives an ordinary end.
        assert!(fx.store.prefix_deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_lab_on_unknown_id_is_not_found() {
        let fx = fixture(5);
        let err = fx.controller.end_lab("ghost").await.unwrap_err();
        assert!(matches!(err, AdmissionError::LabNotFound { .. }));
        assert!(fx.orchestrator.tear_downs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_lab_also_removes_durable_content() {
        let fx = fixture(5);
        fx.controller.start_playground(playground("lab-1")).await.unwrap();

        fx.controller.delete_lab("lab-1").await.unwrap();
        assert_eq!(
            fx.store.prefix_deletes.lock().unwrap().as_slice(),
            ["code/go/lab-1"]
        );
        assert!(fx.registry.get("lab-1").await.unwrap().is_none());
    }
}
