//! Delegations and invocations
//!
//! Both are UCAN-shaped tokens: an issuer grants (delegation) or exercises
//! (invocation) capabilities towards an audience, optionally backed by
//! proofs. A token is only ever handed out in verified form, so holding a
//! `Delegation` or `Invocation` means its signature has been checked against
//! the issuer's DID.

use crate::capability::Capability;
use crate::crypto::{content_id, Payload, SignedUcan, Signer};
use crate::did::Did;
use crate::error::{InvocationError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token payload shared by delegations and invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UcanPayload {
    /// Issuer - the principal that signed this token
    pub iss: Did,

    /// Audience - the principal this token is addressed to
    pub aud: Did,

    /// Attenuations - the capabilities granted or exercised
    pub att: Vec<Capability>,

    /// Expiration
    #[serde(default, skip_serializing_if = "Option::is_none", with = "chrono::serde::ts_seconds_option")]
    pub exp: Option<DateTime<Utc>>,

    /// Not before
    #[serde(default, skip_serializing_if = "Option::is_none", with = "chrono::serde::ts_seconds_option")]
    pub nbf: Option<DateTime<Utc>>,

    /// Nonce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nnc: Option<String>,

    /// Proofs - encoded signed delegations backing `att`
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "serde_base64_vec")]
    pub prf: Vec<Vec<u8>>,
}

impl Payload for UcanPayload {}

/// Base64 serialization for a list of encoded tokens
mod serde_base64_vec {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(items.iter().map(|bytes| STANDARD.encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

impl UcanPayload {
    /// Create a payload without time bounds, nonce or proofs
    pub fn new(iss: Did, aud: Did, att: Vec<Capability>) -> Self {
        Self {
            iss,
            aud,
            att,
            exp: None,
            nbf: None,
            nnc: None,
            prf: Vec::new(),
        }
    }

    /// Validate the time bounds against `now`
    pub fn validate_time(&self, now: DateTime<Utc>) -> Result<()> {
        if let Some(exp) = self.exp {
            if now > exp {
                return Err(InvocationError::Expired(exp.to_rfc3339()));
            }
        }

        if let Some(nbf) = self.nbf {
            if now < nbf {
                return Err(InvocationError::NotValidBefore(nbf.to_rfc3339()));
            }
        }

        Ok(())
    }
}

/// Decode and verify a signed token, checking the envelope key id against `iss`
fn decode_verified(bytes: &[u8]) -> Result<(SignedUcan, UcanPayload)> {
    let signed = SignedUcan::from_bytes(bytes)?;
    let (signer, payload) = signed.verify_self_describing()?;

    if signer != payload.iss {
        return Err(InvocationError::InvalidSignature(format!(
            "token issued by '{}' but signed by '{}'",
            payload.iss, signer
        )));
    }

    Ok((signed, payload))
}

/// A verified delegation
#[derive(Debug, Clone)]
pub struct Delegation {
    bytes: Vec<u8>,
    payload: UcanPayload,
}

impl Delegation {
    /// Decode a delegation and verify its signature
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (_, payload) = decode_verified(bytes)?;
        Ok(Self {
            bytes: bytes.to_vec(),
            payload,
        })
    }

    /// Content id of the encoded delegation
    pub fn id(&self) -> String {
        content_id(&self.bytes)
    }

    /// Encoded COSE_Sign1 bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Verified payload
    pub fn payload(&self) -> &UcanPayload {
        &self.payload
    }

    /// Issuer
    pub fn issuer(&self) -> &Did {
        &self.payload.iss
    }

    /// Audience
    pub fn audience(&self) -> &Did {
        &self.payload.aud
    }

    /// Delegated capabilities
    pub fn capabilities(&self) -> &[Capability] {
        &self.payload.att
    }
}

/// A verified invocation of exactly one capability
#[derive(Debug, Clone)]
pub struct Invocation {
    bytes: Vec<u8>,
    payload: UcanPayload,
}

impl Invocation {
    /// Decode an invocation and verify its signature
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (_, payload) = decode_verified(bytes)?;

        if payload.att.len() != 1 {
            return Err(InvocationError::InvalidInvocation(format!(
                "expected exactly one capability, got {}",
                payload.att.len()
            )));
        }

        Ok(Self {
            bytes: bytes.to_vec(),
            payload,
        })
    }

    /// Content id of the encoded invocation
    pub fn id(&self) -> String {
        content_id(&self.bytes)
    }

    /// Encoded COSE_Sign1 bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Verified payload
    pub fn payload(&self) -> &UcanPayload {
        &self.payload
    }

    /// Issuer
    pub fn issuer(&self) -> &Did {
        &self.payload.iss
    }

    /// Audience
    pub fn audience(&self) -> &Did {
        &self.payload.aud
    }

    /// The invoked capability
    pub fn capability(&self) -> &Capability {
        &self.payload.att[0]
    }

    /// Encoded proofs
    pub fn proofs(&self) -> &[Vec<u8>] {
        &self.payload.prf
    }
}

/// Builder for delegations and invocations
///
/// # Example
///
/// ```ignore
/// let invocation = UcanBuilder::new(&alice)
///     .audience(service.did().clone())
///     .capability(Capability::new("test/echo", alice.did().as_str()).with_caveat("echo", "hi"))
///     .invoke()?;
/// ```
#[derive(Debug)]
pub struct UcanBuilder<'a> {
    issuer: &'a Signer,
    audience: Option<Did>,
    att: Vec<Capability>,
    exp: Option<DateTime<Utc>>,
    nbf: Option<DateTime<Utc>>,
    nnc: Option<String>,
    prf: Vec<Vec<u8>>,
}

impl<'a> UcanBuilder<'a> {
    /// Create a builder for tokens issued by `issuer`
    pub fn new(issuer: &'a Signer) -> Self {
        Self {
            issuer,
            audience: None,
            att: Vec::new(),
            exp: None,
            nbf: None,
            nnc: None,
            prf: Vec::new(),
        }
    }

    /// Set the audience
    pub fn audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Add a capability
    pub fn capability(mut self, capability: Capability) -> Self {
        self.att.push(capability);
        self
    }

    /// Set the expiration
    pub fn expiration(mut self, exp: DateTime<Utc>) -> Self {
        self.exp = Some(exp);
        self
    }

    /// Expire `duration` from now
    pub fn expires_in(self, duration: Duration) -> Self {
        self.expiration(Utc::now() + duration)
    }

    /// Set not-before
    pub fn not_before(mut self, nbf: DateTime<Utc>) -> Self {
        self.nbf = Some(nbf);
        self
    }

    /// Set the nonce
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nnc = Some(nonce.into());
        self
    }

    /// Attach a delegation as proof
    pub fn proof(mut self, delegation: &Delegation) -> Self {
        self.prf.push(delegation.as_bytes().to_vec());
        self
    }

    fn sign(self) -> Result<Vec<u8>> {
        let aud = self
            .audience
            .ok_or(InvocationError::MissingField("aud".into()))?;

        let payload = UcanPayload {
            iss: self.issuer.did().clone(),
            aud,
            att: self.att,
            exp: self.exp,
            nbf: self.nbf,
            nnc: self.nnc,
            prf: self.prf,
        };

        self.issuer.sign(&payload)?.to_bytes()
    }

    /// Sign a delegation
    pub fn delegate(self) -> Result<Delegation> {
        if self.att.is_empty() {
            return Err(InvocationError::MissingField("att".into()));
        }
        let bytes = self.sign()?;
        Delegation::decode(&bytes)
    }

    /// Sign an invocation
    ///
    /// Requires exactly one capability. A random nonce is added unless one was set,
    /// so repeated invocations of the same capability have distinct ids.
    pub fn invoke(mut self) -> Result<Invocation> {
        if self.att.len() != 1 {
            return Err(InvocationError::InvalidInvocation(format!(
                "expected exactly one capability, got {}",
                self.att.len()
            )));
        }
        if self.nnc.is_none() {
            self.nnc = Some(uuid::Uuid::new_v4().to_string());
        }
        let bytes = self.sign()?;
        Invocation::decode(&bytes)
    }
}
