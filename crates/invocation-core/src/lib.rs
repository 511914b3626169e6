//! # Invocation Core
//!
//! Types and cryptographic primitives for signed capability invocations.
//!
//! ## Key Concepts
//!
//! - **Capability**: an ability (`can`) on a resource (`with`) with caveats (`nb`)
//! - **Delegation**: a signed grant of capabilities from one principal to another
//! - **Invocation**: a signed request to exercise exactly one capability
//! - **Receipt**: the signed outcome of running an invocation
//!
//! Principals are `did:key` identities backed by Ed25519 keys; tokens and
//! receipts are COSE_Sign1 envelopes around JSON payloads.
//!
//! ## Authorization
//!
//! An invocation is authorized when its issuer owns the resource
//! (`with == iss`) or presents a chain of delegations, each addressed to the
//! next principal, from which the claimed capability derives.

pub mod capability;
pub mod crypto;
pub mod did;
pub mod error;
pub mod message;
pub mod receipt;
pub mod ucan;
pub mod validator;

pub use capability::{
    ability_covers, default_derives, Capability, CapabilityDescriptor, Caveats, DeriveError, Derives,
    ParsedCapability, ResourceSchema,
};
pub use crypto::{CoseSigned, SignedReceipt, SignedUcan, Signer, Verifier};
pub use did::Did;
pub use error::{InvocationError, Result};
pub use message::{InvocationRequest, ReceiptResponse, MEDIA_TYPE};
pub use receipt::{Effects, Failure, Outcome, Receipt};
pub use ucan::{Delegation, Invocation, UcanBuilder, UcanPayload};
pub use validator::{access, Authorization, ValidationContext, MAX_PROOF_CHECKS, MAX_PROOF_DEPTH};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
