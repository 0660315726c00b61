//! In-sandbox runner service.
//!
//! One runner process serves one lab instance from inside its pod: it owns
//! the confined workspace, exposes the editor WebSocket at `/fs`, and accepts
//! reconciliation triggers at `/fs/sync` (used by the gateway before
//! teardown, and available for periodic checkpoints).

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info};

use crate::config::RunnerConfig;
use crate::models::{LabInstance, LabStatus, ProgressEntry, ServiceOrigin};
use crate::registry::{MemoryRegistry, RegistryStore};
use crate::session::{ws_handler, SessionDeps, WsContext};
use crate::sync::{FsObjectStore, ReconcileEngine};
use crate::tracker::DirtyTracker;
use crate::workspace::Workspace;

pub struct RunnerState {
    pub lab_id: String,
    pub tracker: DirtyTracker,
    pub engine: Arc<ReconcileEngine>,
    pub ws: Arc<WsContext>,
}

/// Assemble the runner's components and register this pod's lab instance.
pub async fn build_state(config: &RunnerConfig) -> anyhow::Result<Arc<RunnerState>> {
    if config.lab_id.is_empty() {
        anyhow::bail!("LAB_ID must be set for the runner");
    }

    let workspace = Arc::new(Workspace::open(&config.workspace_dir)?);
    let registry: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());
    let store = Arc::new(FsObjectStore::new(&config.storage_root));

    registry
        .put(LabInstance::new(
            &config.lab_id,
            &config.language,
            None,
            &config.code_link,
        ))
        .await?;
    let tracker = DirtyTracker::new(registry.clone());
    tracker
        .append_progress(
            &config.lab_id,
            ProgressEntry::now(
                LabStatus::Active,
                "File System Service Started",
                ServiceOrigin::FileSystem,
            ),
        )
        .await?;
    info!(
        lab_id = config.lab_id,
        workspace = %config.workspace_dir.display(),
        "runner registered its lab instance"
    );
    let engine = Arc::new(ReconcileEngine::new(
        workspace.clone(),
        registry,
        store,
        config.sync_workers,
    ));

    let deps = SessionDeps {
        workspace,
        tracker: tracker.clone(),
        engine: engine.clone(),
    };
    let ws = Arc::new(WsContext { deps, ping_interval: config.ping_interval });

    Ok(Arc::new(RunnerState {
        lab_id: config.lab_id.clone(),
        tracker,
        engine,
        ws,
    }))
}

pub fn router(state: Arc<RunnerState>) -> Router {
    Router::new()
        .route("/fs", get(upgrade))
        .route("/fs/health", get(health))
        .route("/fs/sync", post(trigger_sync))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn upgrade(State(state): State<Arc<RunnerState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws_handler(ws, state.ws.clone()).await
}

/// Reconcile the lab's dirty set to durable storage and report the result.
async fn trigger_sync(State(state): State<Arc<RunnerState>>) -> impl IntoResponse {
    match state.engine.sync_and_clean(&state.lab_id, &state.tracker).await {
        Ok(report) => {
            let failures =
                report.soft_failures + usize::from(report.fatal.is_some());
            let status = if report.fatal.is_some() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(json!({
                    "success": report.fatal.is_none(),
                    "synced": report.applied.len(),
                    "failures": failures,
                })),
            )
        }
        Err(e) => {
            error!(error = %e, "sync trigger failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}
