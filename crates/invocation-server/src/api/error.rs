//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::DispatchError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message, details) = match &self {
            ApiError::Dispatch(DispatchError::HandlerNotFound(can)) => (
                "HANDLER_NOT_FOUND",
                self.to_string(),
                Some(serde_json::json!({ "can": can })),
            ),
            ApiError::Dispatch(DispatchError::Signing(_)) => ("RECEIPT_SIGNING_FAILED", self.to_string(), None),
            ApiError::Dispatch(DispatchError::Encode(_)) => ("ENCODING_FAILED", self.to_string(), None),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
