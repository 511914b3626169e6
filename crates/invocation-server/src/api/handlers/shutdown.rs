//! Shutdown Handler

use axum::{extract::State, http::StatusCode};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::AppState;

/// Request shutdown
///
/// ANY /shutdown
///
/// Always answers 202; the listener closes once the grace delay has passed.
pub async fn shutdown(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.shutdown.trigger() {
        info!(grace_ms = state.shutdown.grace().as_millis() as u64, "Shutdown requested");
    } else {
        debug!("Shutdown already in progress");
    }

    StatusCode::ACCEPTED
}
