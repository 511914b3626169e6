//! Receipts
//!
//! A receipt is the signed outcome of running an invocation. It names the
//! invocation it answers (`ran`), the result (`out`), follow-up effects
//! (`fx`) and the principal that executed it (`iss`).

use crate::crypto::{Payload, SignedReceipt, Signer};
use crate::did::Did;
use crate::error::{InvocationError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of executing an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Success value
    Ok(Value),
    /// Failure
    Error(Failure),
}

impl Outcome {
    /// Check for success
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    /// Success value, if any
    pub fn ok(&self) -> Option<&Value> {
        match self {
            Outcome::Ok(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    /// Failure, if any
    pub fn error(&self) -> Option<&Failure> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Error(failure) => Some(failure),
        }
    }
}

/// A named failure carried in a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure name (e.g. "Unauthorized")
    pub name: String,

    /// Human-readable message
    pub message: String,
}

impl Failure {
    /// Create a failure
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Failure raised by a capability handler
    pub fn handler(message: impl Into<String>) -> Self {
        Self::new("HandlerExecutionError", message)
    }
}

impl From<&InvocationError> for Failure {
    fn from(err: &InvocationError) -> Self {
        let name = match err {
            InvocationError::InvalidSignature(_) => "InvalidSignature",
            InvocationError::InvalidAudience { .. } => "InvalidAudience",
            InvocationError::Expired(_) => "Expired",
            InvocationError::NotValidBefore(_) => "NotValidBefore",
            InvocationError::MalformedCapability { .. } => "MalformedCapability",
            InvocationError::Unauthorized { .. } => "Unauthorized",
            InvocationError::InvalidDid(_) | InvocationError::UnsupportedDid(_) => "InvalidSignature",
            InvocationError::InvalidInvocation(_) | InvocationError::MissingField(_) => "InvalidInvocation",
            _ => "InvocationError",
        };
        Self::new(name, err.to_string())
    }
}

impl From<InvocationError> for Failure {
    fn from(err: InvocationError) -> Self {
        Failure::from(&err)
    }
}

/// Follow-up invocations requested by a handler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effects {
    /// Invocations that may run concurrently
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fork: Vec<String>,

    /// Invocation continuing this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
}

impl Effects {
    /// Check for no effects
    pub fn is_empty(&self) -> bool {
        self.fork.is_empty() && self.join.is_none()
    }
}

/// Receipt payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptPayload {
    /// Id of the invocation this receipt answers
    pub ran: String,

    /// Outcome
    pub out: Outcome,

    /// Effects
    #[serde(default, skip_serializing_if = "Effects::is_empty")]
    pub fx: Effects,

    /// Executor
    pub iss: Did,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Payload for ReceiptPayload {}

/// A verified receipt
#[derive(Debug, Clone)]
pub struct Receipt {
    bytes: Vec<u8>,
    payload: ReceiptPayload,
}

impl Receipt {
    /// Sign a receipt for the invocation with id `ran`
    pub fn issue(signer: &Signer, ran: impl Into<String>, out: Outcome, fx: Effects) -> Result<Self> {
        let payload = ReceiptPayload {
            ran: ran.into(),
            out,
            fx,
            iss: signer.did().clone(),
            meta: Map::new(),
        };

        let bytes = signer.sign(&payload)?.to_bytes()?;
        Ok(Self { bytes, payload })
    }

    /// Decode a receipt and verify it was signed by its issuer
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let signed = SignedReceipt::from_bytes(bytes)?;
        let (signer, payload) = signed.verify_self_describing()?;

        if signer != payload.iss {
            return Err(InvocationError::InvalidSignature(format!(
                "receipt issued by '{}' but signed by '{}'",
                payload.iss, signer
            )));
        }

        Ok(Self {
            bytes: bytes.to_vec(),
            payload,
        })
    }

    /// Encoded COSE_Sign1 bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Verified payload
    pub fn payload(&self) -> &ReceiptPayload {
        &self.payload
    }

    /// Id of the invocation this receipt answers
    pub fn ran(&self) -> &str {
        &self.payload.ran
    }

    /// Outcome
    pub fn out(&self) -> &Outcome {
        &self.payload.out
    }

    /// Executor
    pub fn issuer(&self) -> &Did {
        &self.payload.iss
    }
}
