//! HTTP routing for the invocation server

pub mod error;
pub mod handlers;

use axum::{
    extract::State,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::dispatch::InvocationServer;
use crate::lifecycle::ShutdownController;

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    /// Dispatcher for invocation envelopes
    pub server: InvocationServer,
    /// Lifecycle controller driven by `/shutdown`
    pub shutdown: Arc<ShutdownController>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub id: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        id: state.server.id().to_string(),
    })
}

/// Create the API router
///
/// Every path other than `/health` and `/shutdown` carries invocations.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/shutdown", any(handlers::shutdown))
        .fallback(handlers::invoke)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
