//! Decentralized identifiers
//!
//! Principals are named by DIDs. Only `did:key` identifiers carrying an
//! Ed25519 public key can verify signatures; any other well-formed DID is
//! still accepted as a resource identifier (the `with` of a capability).

use crate::error::{InvocationError, Result};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Multicodec prefix for an Ed25519 public key (varint 0xed)
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Multibase prefix for base58btc
const BASE58BTC_PREFIX: char = 'z';

const DID_KEY_PREFIX: &str = "did:key:";

/// A validated DID string (`did:<method>:<method-specific-id>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse and validate a DID string
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let mut parts = s.splitn(3, ':');

        if parts.next() != Some("did") {
            return Err(InvocationError::InvalidDid(format!("'{}' does not start with 'did:'", s)));
        }

        let method = parts.next().unwrap_or_default();
        if method.is_empty() || !method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(InvocationError::InvalidDid(format!("'{}' has an invalid method", s)));
        }

        match parts.next() {
            Some(id) if !id.is_empty() => Ok(Self(s)),
            _ => Err(InvocationError::InvalidDid(format!("'{}' has an empty identifier", s))),
        }
    }

    /// Render an Ed25519 verifying key as a `did:key`
    pub fn from_ed25519(key: &VerifyingKey) -> Self {
        let mut bytes = Vec::with_capacity(ED25519_MULTICODEC.len() + 32);
        bytes.extend_from_slice(&ED25519_MULTICODEC);
        bytes.extend_from_slice(key.as_bytes());

        Self(format!(
            "{}{}{}",
            DID_KEY_PREFIX,
            BASE58BTC_PREFIX,
            bs58::encode(bytes).into_string()
        ))
    }

    /// Get the DID method (`key`, `web`, ...)
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// Extract the Ed25519 verifying key of a `did:key`
    pub fn ed25519_key(&self) -> Result<VerifyingKey> {
        let encoded = self
            .0
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| InvocationError::UnsupportedDid(self.0.clone()))?;

        let encoded = encoded.strip_prefix(BASE58BTC_PREFIX).ok_or_else(|| {
            InvocationError::UnsupportedDid(format!("{} (multibase is not base58btc)", self.0))
        })?;

        let bytes = bs58::decode(encoded).into_vec()?;

        let key = bytes
            .strip_prefix(&ED25519_MULTICODEC[..])
            .ok_or_else(|| InvocationError::UnsupportedDid(format!("{} (not an Ed25519 key)", self.0)))?;

        let key: [u8; 32] = key.try_into().map_err(|_| {
            InvocationError::InvalidDid(format!(
                "{} (expected 32 key bytes, got {})",
                self.0,
                key.len()
            ))
        })?;

        VerifyingKey::from_bytes(&key).map_err(InvocationError::from)
    }

    /// Get the DID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = InvocationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = InvocationError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl PartialEq<str> for Did {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
