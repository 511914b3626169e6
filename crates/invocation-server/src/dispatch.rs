//! Invocation dispatcher
//!
//! Turns an HTTP request (headers and body) into an HTTP response carrying
//! one signed receipt per invocation. The dispatcher knows nothing about
//! sockets; `api::handlers::invoke` adapts it to axum.
//!
//! Request handling:
//!
//! 1. Check `Content-Type` (415) and `Accept` (406)
//! 2. Decode the JSON envelope, the base64 layer and each COSE envelope (400)
//! 3. Verify each invocation's signature (failure receipt)
//! 4. Resolve the ability to a registered handler (`HandlerNotFound`)
//! 5. Validate and execute (failure or success receipt)
//! 6. Sign receipts and encode them in invocation order

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde_json::json;
use tracing::{debug, info, warn};

use invocation_core::crypto::content_id;
use invocation_core::message::{accepts_media_type, is_supported_content_type};
use invocation_core::{
    Did, Effects, Failure, Invocation, InvocationRequest, Outcome, Receipt, ReceiptResponse,
    SignedUcan, Signer, MEDIA_TYPE,
};

use crate::error::DispatchError;
use crate::service::{InvocationContext, Service};

/// Transport-agnostic request
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    /// Create a request
    pub fn new(headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }
}

/// Transport-agnostic response
///
/// `status` is `None` when the transport should use its default (200).
#[derive(Debug)]
pub struct HttpResponse {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Body,
}

impl HttpResponse {
    fn json(status: Option<StatusCode>, body: impl Into<Body>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE));
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    fn rejection(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        debug!(status = %status, code = code, message = %message, "Rejecting request");
        let body = json!({ "error": message, "code": code }).to_string();
        Self::json(Some(status), body)
    }
}

/// A signing identity bound to a capability service
#[derive(Debug, Clone)]
pub struct InvocationServer {
    signer: Signer,
    service: Service,
}

impl InvocationServer {
    /// Create a server that signs receipts as `signer`
    pub fn new(signer: Signer, service: Service) -> Self {
        info!(id = %signer.did(), abilities = ?service.abilities(), "Invocation server created");
        Self { signer, service }
    }

    /// DID of the server
    pub fn id(&self) -> &Did {
        self.signer.did()
    }

    /// Registered capabilities
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Handle one transport request
    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse, DispatchError> {
        let received_at = Utc::now();

        if let Some(rejection) = check_headers(&request.headers) {
            return Ok(rejection);
        }

        let envelope = match InvocationRequest::from_bytes(&request.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                return Ok(HttpResponse::rejection(
                    StatusCode::BAD_REQUEST,
                    "BAD_REQUEST",
                    format!("Invalid request body: {}", e),
                ))
            }
        };

        let encoded = match envelope.decode_bytes() {
            Ok(encoded) => encoded,
            Err(e) => return Ok(HttpResponse::rejection(StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string())),
        };

        // Structural check for the whole batch before anything runs
        for (index, bytes) in encoded.iter().enumerate() {
            if let Err(e) = SignedUcan::from_bytes(bytes) {
                return Ok(HttpResponse::rejection(
                    StatusCode::BAD_REQUEST,
                    "BAD_REQUEST",
                    format!("Invocation {} is not a signed envelope: {}", index, e),
                ));
            }
        }

        let receipts = try_join_all(encoded.iter().map(|bytes| self.run(bytes, received_at))).await?;

        let body = ReceiptResponse::new(&receipts)
            .to_bytes()
            .map_err(|e| DispatchError::Encode(e.to_string()))?;

        Ok(HttpResponse::json(None, body))
    }

    /// Verify, validate and execute one encoded invocation
    async fn run(&self, bytes: &[u8], received_at: DateTime<Utc>) -> Result<Receipt, DispatchError> {
        let id = content_id(bytes);

        let invocation = match Invocation::decode(bytes) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!(invocation = %id, error = %e, "Invocation failed verification");
                return self.issue(id, Outcome::Error(Failure::from(&e)));
            }
        };

        let can = &invocation.capability().can;
        let method = self
            .service
            .get(can)
            .ok_or_else(|| DispatchError::HandlerNotFound(can.clone()))?;

        let ctx = InvocationContext {
            id: self.signer.did().clone(),
            invocation_id: id.clone(),
            received_at,
        };

        let out = method.invoke(&invocation, &ctx).await;

        info!(
            invocation = %id,
            can = %can,
            issuer = %invocation.issuer(),
            ok = out.is_ok(),
            "Invocation executed"
        );

        self.issue(id, out)
    }

    fn issue(&self, ran: String, out: Outcome) -> Result<Receipt, DispatchError> {
        Receipt::issue(&self.signer, ran, out, Effects::default()).map_err(DispatchError::Signing)
    }
}

/// Check content negotiation headers, returning a rejection if they fail
fn check_headers(headers: &HeaderMap) -> Option<HttpResponse> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !is_supported_content_type(content_type) {
        return Some(HttpResponse::rejection(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_MEDIA_TYPE",
            format!("Content-Type must be {}, got '{}'", MEDIA_TYPE, content_type),
        ));
    }

    if let Some(accept) = headers.get(header::ACCEPT) {
        let acceptable = accept.to_str().map(accepts_media_type).unwrap_or(false);
        if !acceptable {
            return Some(HttpResponse::rejection(
                StatusCode::NOT_ACCEPTABLE,
                "NOT_ACCEPTABLE",
                format!("Responses are only available as {}", MEDIA_TYPE),
            ));
        }
    }

    None
}
