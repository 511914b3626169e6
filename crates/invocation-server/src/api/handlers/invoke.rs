//! Invocation Handler
//!
//! Adapts axum requests to the dispatcher and relays its response: headers
//! are copied, the status is written only when the dispatcher set one, and
//! the body is streamed back. Stream errors are logged, not surfaced.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::HeaderMap,
    response::Response,
};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{error, warn};

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::dispatch::{HttpRequest, HttpResponse};

/// Dispatch an invocation envelope
///
/// ANY /*
pub async fn invoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let response = state
        .server
        .request(HttpRequest::new(headers, body))
        .await
        .map_err(|e| {
            error!(error = %e, "Dispatch failed");
            ApiError::from(e)
        })?;

    Ok(relay(response))
}

fn relay(response: HttpResponse) -> Response {
    let HttpResponse { status, headers, body } = response;

    let stream = body
        .into_data_stream()
        .inspect_err(|e| warn!(error = %e, "Failed to stream response body"));

    let mut relayed = Response::new(Body::from_stream(stream));
    if let Some(status) = status {
        *relayed.status_mut() = status;
    }
    relayed.headers_mut().extend(headers);
    relayed
}
