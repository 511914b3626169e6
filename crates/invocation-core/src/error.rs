//! Error types for signed capability invocations

use thiserror::Error;

/// Result type alias using InvocationError
pub type Result<T> = std::result::Result<T, InvocationError>;

/// Errors that can occur while signing, decoding or validating invocations
#[derive(Error, Debug)]
pub enum InvocationError {
    /// String is not a well-formed DID
    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    /// DID method or key type cannot verify signatures
    #[error("Unsupported DID: {0}")]
    UnsupportedDid(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    InvalidSignature(String),

    /// Token audience is not the expected principal
    #[error("Invalid audience: expected '{expected}', got '{actual}'")]
    InvalidAudience { expected: String, actual: String },

    /// Token has expired
    #[error("Token expired at {0}")]
    Expired(String),

    /// Token is not valid yet
    #[error("Token not valid before {0}")]
    NotValidBefore(String),

    /// Capability does not match the descriptor it was checked against
    #[error("Malformed capability '{can}': {reason}")]
    MalformedCapability { can: String, reason: String },

    /// No proof chain authorizes the claimed capability
    #[error("Unauthorized '{can}' on '{with}': {}", causes.join("; "))]
    Unauthorized {
        can: String,
        with: String,
        causes: Vec<String>,
    },

    /// Token cannot be used as an invocation
    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    /// COSE encoding/decoding error
    #[error("COSE error: {0}")]
    CoseError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl From<ed25519_dalek::SignatureError> for InvocationError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        InvocationError::CryptoError(err.to_string())
    }
}

impl From<serde_json::Error> for InvocationError {
    fn from(err: serde_json::Error) -> Self {
        InvocationError::SerializationError(err.to_string())
    }
}

impl From<coset::CoseError> for InvocationError {
    fn from(err: coset::CoseError) -> Self {
        InvocationError::CoseError(format!("{:?}", err))
    }
}

impl From<base64::DecodeError> for InvocationError {
    fn from(err: base64::DecodeError) -> Self {
        InvocationError::SerializationError(format!("Invalid base64 encoding: {}", err))
    }
}

impl From<bs58::decode::Error> for InvocationError {
    fn from(err: bs58::decode::Error) -> Self {
        InvocationError::InvalidDid(format!("Invalid base58btc key: {}", err))
    }
}
