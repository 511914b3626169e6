//! HTTP wire messages
//!
//! A request carries a batch of encoded invocations; the response carries one
//! encoded receipt per invocation, in the same order. Encoded tokens are
//! base64 COSE_Sign1 bytes inside a JSON envelope.

use crate::error::{InvocationError, Result};
use crate::receipt::Receipt;
use crate::ucan::Invocation;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Media type of request and response bodies
pub const MEDIA_TYPE: &str = "application/json";

/// Batch of invocations sent to a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Base64-encoded signed invocations
    pub invocations: Vec<String>,
}

impl InvocationRequest {
    /// Build a request from invocations
    pub fn new<'a>(invocations: impl IntoIterator<Item = &'a Invocation>) -> Self {
        Self {
            invocations: invocations
                .into_iter()
                .map(|inv| STANDARD.encode(inv.as_bytes()))
                .collect(),
        }
    }

    /// Decode the base64 layer, yielding the raw COSE bytes of each invocation
    pub fn decode_bytes(&self) -> Result<Vec<Vec<u8>>> {
        self.invocations
            .iter()
            .map(|encoded| STANDARD.decode(encoded).map_err(InvocationError::from))
            .collect()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(InvocationError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(InvocationError::from)
    }
}

/// Receipts returned by a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptResponse {
    /// Base64-encoded signed receipts, in invocation order
    pub receipts: Vec<String>,
}

impl ReceiptResponse {
    /// Build a response from receipts
    pub fn new<'a>(receipts: impl IntoIterator<Item = &'a Receipt>) -> Self {
        Self {
            receipts: receipts
                .into_iter()
                .map(|receipt| STANDARD.encode(receipt.as_bytes()))
                .collect(),
        }
    }

    /// Decode and verify every receipt
    pub fn decode_receipts(&self) -> Result<Vec<Receipt>> {
        self.receipts
            .iter()
            .map(|encoded| Receipt::decode(&STANDARD.decode(encoded)?))
            .collect()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(InvocationError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(InvocationError::from)
    }
}

/// Check whether a `Content-Type` value names the wire media type
pub fn is_supported_content_type(value: &str) -> bool {
    media_type_essence(value).eq_ignore_ascii_case(MEDIA_TYPE)
}

/// Check whether an `Accept` value admits the wire media type
pub fn accepts_media_type(value: &str) -> bool {
    value.split(',').map(media_type_essence).any(|range| {
        range == "*/*" || range.eq_ignore_ascii_case("application/*") || range.eq_ignore_ascii_case(MEDIA_TYPE)
    })
}

/// Media type without parameters or surrounding whitespace
fn media_type_essence(value: &str) -> &str {
    value.split(';').next().unwrap_or_default().trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::crypto::Signer;
    use crate::receipt::{Effects, Outcome};
    use crate::ucan::UcanBuilder;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let alice = Signer::generate();
        let invocation = UcanBuilder::new(&alice)
            .audience(alice.did().clone())
            .capability(Capability::new("test/echo", alice.did().as_str()).with_caveat("echo", "x"))
            .invoke()
            .unwrap();

        let request = InvocationRequest::new([&invocation]);
        let restored = InvocationRequest::from_bytes(&request.to_bytes().unwrap()).unwrap();
        let raw = restored.decode_bytes().unwrap();

        assert_eq!(raw.len(), 1);
        assert_eq!(Invocation::decode(&raw[0]).unwrap().id(), invocation.id());
    }

    #[test]
    fn test_response_decodes_receipts() {
        let service = Signer::generate();
        let receipt = Receipt::issue(&service, "inv", Outcome::Ok(json!("x")), Effects::default()).unwrap();

        let response = ReceiptResponse::new([&receipt]);
        let decoded = response.decode_receipts().unwrap();
        assert_eq!(decoded[0].ran(), "inv");
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let request = InvocationRequest {
            invocations: vec!["not base64!".into()],
        };
        assert!(request.decode_bytes().is_err());
    }

    #[test]
    fn test_content_type_matching() {
        assert!(is_supported_content_type("application/json"));
        assert!(is_supported_content_type("application/json; charset=utf-8"));
        assert!(is_supported_content_type("Application/JSON"));
        assert!(!is_supported_content_type("application/cbor"));
        assert!(!is_supported_content_type(""));
    }

    #[test]
    fn test_accept_matching() {
        assert!(accepts_media_type("*/*"));
        assert!(accepts_media_type("application/*"));
        assert!(accepts_media_type("text/html, application/json;q=0.9"));
        assert!(!accepts_media_type("text/html"));
        assert!(!accepts_media_type("application/cbor"));
    }
}
