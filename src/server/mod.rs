//! HTTP host for the worker: a local proxy in front of the quiz origin.
//!
//! - [`proxy`]: request interception routes
//! - [`control`]: health, status and page messages

pub mod control;
pub mod proxy;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{any, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::network::SharedNetwork;
use crate::worker::service::ServiceWorker;

/// Application state shared across handlers.
pub struct AppState {
    pub worker: ServiceWorker,

    /// Used for requests the worker passes through.
    pub network: SharedNetwork,
    pub start_time: Instant,
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(control::health))
        .route("/sw/status", get(control::status))
        .route("/sw/message", post(control::message))
        .route("/proxy", any(proxy::proxy_url))
        .fallback(proxy::proxy_path)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
