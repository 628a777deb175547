// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::pipeline::{Runner, RunSummary};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/status", get(status))
        .route("/api/run", post(trigger_run))
        .route("/api/cancel", post(cancel_run))
        .route("/metrics", get(metrics_endpoint))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": if state.runner.is_running() { "running" } else { "idle" },
        "mode": state.runner.config().report.mode,
        "last": state.runner.last_report(),
    }))
}

#[derive(Deserialize)]
struct RunParams {
    #[serde(default)]
    force: bool,
}

/// Manual trigger. `force=true` bypasses the push window and the notify
/// enable switch. 409 when a run is already in flight.
async fn trigger_run(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
) -> Result<Json<RunSummary>, (StatusCode, String)> {
    match state.runner.trigger_if_idle(params.force).await {
        None => Err((
            StatusCode::CONFLICT,
            "a run is already in progress".to_string(),
        )),
        Some(Ok(summary)) => Ok(Json(summary)),
        Some(Err(e)) => Err((StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))),
    }
}

async fn cancel_run(State(state): State<AppState>) -> StatusCode {
    state.runner.cancel_current();
    StatusCode::ACCEPTED
}

async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .map(|h| h.render())
        .ok_or(StatusCode::NOT_FOUND)
}
