//! Control routes: health, worker status and page messages.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::server::AppState;
use crate::worker::lifecycle::WorkerState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub worker: WorkerState,
}

/// Worker status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: WorkerState,
    pub cache_name: String,
    pub caches: Vec<String>,
    pub entries: usize,
    pub clients_claimed: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub handled: bool,
    pub state: WorkerState,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        worker: state.worker.state(),
    })
}

pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let router = state.worker.router();
    let cache_name = router.config().cache_name.clone();

    let caches = router.storage().keys().await.map_err(|e| {
        error!(error = %e, "Failed to list caches");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let current = router.storage().get(&cache_name).await.map_err(|e| {
        error!(error = %e, "Failed to look up current cache");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let entries = match current {
        Some(cache) => cache.keys().await.map(|k| k.len()).unwrap_or(0),
        None => 0,
    };

    Ok(Json(StatusResponse {
        state: state.worker.state(),
        cache_name,
        caches,
        entries,
        clients_claimed: state.worker.registration().clients_claimed(),
    }))
}

pub async fn message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<MessageResponse>, StatusCode> {
    let handled = state.worker.post_message(&payload).await.map_err(|e| {
        error!(error = %e, "Message handling failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(MessageResponse {
        handled,
        state: state.worker.state(),
    }))
}
