//! Admission gateway: the HTTP surface through which labs are started,
//! ended, and deleted.
//!
//! Every handler delegates to the [`AdmissionController`]; this module only
//! shapes requests and responses and maps [`AdmissionError`] onto status
//! codes. Ending a lab first nudges its runner to flush pending workspace
//! changes; an unreachable runner is logged and the teardown proceeds.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::admission::{AdmissionController, PlaygroundRequest, QuestRequest};
use crate::config::GatewayConfig;
use crate::errors::AdmissionError;
use crate::models::LabInstance;

// ── state ──────────────────────────────────────────────────────────────────

pub struct AppState {
    pub controller: AdmissionController,
    pub http: reqwest::Client,
    /// Runner pods are reachable as `http://{lab_id}.{lab_domain}`.
    pub lab_domain: String,
    pub sync_timeout: Duration,
}

impl AppState {
    pub fn new(controller: AdmissionController, config: &GatewayConfig) -> Self {
        Self {
            controller,
            http: reqwest::Client::new(),
            lab_domain: config.lab_domain.clone(),
            sync_timeout: config.sync_timeout,
        }
    }
}

// ── error mapping ──────────────────────────────────────────────────────────

/// HTTP projection of an [`AdmissionError`].
pub struct ApiError(AdmissionError);

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AdmissionError::Validation(_) => StatusCode::BAD_REQUEST,
            AdmissionError::UserLimit(_) => StatusCode::FORBIDDEN,
            AdmissionError::QuestNotFound { .. } | AdmissionError::LabNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            AdmissionError::Capacity { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "success": false, "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

// ── request / response bodies ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPlaygroundBody {
    pub language: String,
    pub lab_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartQuestBody {
    pub language: String,
    pub quest_slug: String,
    pub user_id: String,
    #[serde(default)]
    pub lab_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabIdBody {
    pub lab_id: String,
}

fn lab_response(lab: LabInstance) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "lab": lab }))
}

// ── router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/start/playground", post(start_playground))
        .route("/v1/start/quest", post(start_quest))
        .route("/v1/end/quest", post(end_lab))
        .route("/v1/delete/quest", delete(delete_lab))
        .route("/v1/status/{lab_id}", get(lab_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn start_playground(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartPlaygroundBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lab = state
        .controller
        .start_playground(PlaygroundRequest {
            language: body.language,
            lab_id: body.lab_id,
            user_id: body.user_id,
        })
        .await?;
    Ok(lab_response(lab))
}

async fn start_quest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartQuestBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lab = state
        .controller
        .start_quest(QuestRequest {
            language: body.language,
            quest_slug: body.quest_slug,
            user_id: body.user_id,
            lab_id: body.lab_id,
        })
        .await?;
    Ok(lab_response(lab))
}

async fn end_lab(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LabIdBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Confirm the lab exists before dialing its runner; unknown ids must
    // fail fast instead of waiting out the flush timeout.
    state.controller.lab_status(&body.lab_id).await?;
    flush_runner(&state, &body.lab_id).await;
    let lab = state.controller.end_lab(&body.lab_id).await?;
    Ok(lab_response(lab))
}

async fn delete_lab(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LabIdBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lab = state.controller.delete_lab(&body.lab_id).await?;
    Ok(lab_response(lab))
}

async fn lab_status(
    State(state): State<Arc<AppState>>,
    Path(lab_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lab = state.controller.lab_status(&lab_id).await?;
    Ok(lab_response(lab))
}

/// Ask the lab's runner to reconcile its dirty paths before teardown. A
/// runner that is slow or already gone must not block the teardown, so every
/// failure here is a warning, not an error.
async fn flush_runner(state: &AppState, lab_id: &str) {
    let url = format!("http://{lab_id}.{}/fs/sync", state.lab_domain);
    let result = state
        .http
        .post(&url)
        .timeout(state.sync_timeout)
        .send()
        .await;
    match result {
        Ok(resp) if resp.status().is_success() => {
            info!(lab_id, "runner flushed before teardown");
        }
        Ok(resp) => {
            warn!(lab_id, status = %resp.status(), "runner flush returned an error; tearing down anyway");
        }
        Err(e) => {
            warn!(lab_id, error = %e, "runner unreachable for flush; tearing down anyway");
        }
    }
}
