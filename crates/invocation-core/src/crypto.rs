//! Cryptographic primitives for invocation and receipt signing
//!
//! Tokens and receipts travel as COSE_Sign1 structures signed with Ed25519.
//! The protected header carries the EdDSA algorithm and the signer's DID as
//! key id, so a verifier can be derived from the envelope itself.
//!
//! Key types:
//! - `Signer`: Ed25519 key pair identified by its `did:key`
//! - `Verifier`: Ed25519 public key identified by its `did:key`
//! - `SignedUcan`: COSE_Sign1 wrapped delegation or invocation payload
//! - `SignedReceipt`: COSE_Sign1 wrapped receipt payload

use crate::did::Did;
use crate::error::{InvocationError, Result};
use crate::receipt::ReceiptPayload;
use crate::ucan::UcanPayload;
use coset::{iana, CborSerializable, CoseSign1, CoseSign1Builder, HeaderBuilder};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::marker::PhantomData;

/// COSE algorithm identifier for EdDSA (Ed25519)
const EDDSA_ALG: iana::Algorithm = iana::Algorithm::EdDSA;

/// A payload that can be carried inside a COSE_Sign1 envelope
pub trait Payload: Serialize + DeserializeOwned {
    /// Serialize to JSON bytes
    fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(InvocationError::from)
    }

    /// Deserialize from JSON bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(InvocationError::from)
    }
}

/// A signed COSE_Sign1 structure
#[derive(Debug, Clone)]
pub struct CoseSigned<T> {
    /// The COSE_Sign1 structure
    cose: CoseSign1,
    /// Phantom type marker
    _marker: PhantomData<T>,
}

/// Signed delegation or invocation (COSE_Sign1 wrapped)
pub type SignedUcan = CoseSigned<UcanPayload>;

/// Signed receipt (COSE_Sign1 wrapped)
pub type SignedReceipt = CoseSigned<ReceiptPayload>;

impl<T: Payload> CoseSigned<T> {
    /// Get the raw COSE_Sign1 structure
    pub fn cose(&self) -> &CoseSign1 {
        &self.cose
    }

    /// Get the key ID from the protected header
    pub fn kid(&self) -> Option<String> {
        let kid = &self.cose.protected.header.key_id;
        if kid.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(kid).to_string())
        }
    }

    /// Get the signature bytes
    pub fn signature(&self) -> &[u8] {
        &self.cose.signature
    }

    /// Serialize to CBOR bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.cose.clone().to_vec().map_err(InvocationError::from)
    }

    /// Deserialize from CBOR bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let cose = CoseSign1::from_slice(bytes).map_err(InvocationError::from)?;
        Ok(Self {
            cose,
            _marker: PhantomData,
        })
    }

    /// Extract and deserialize the payload
    ///
    /// Note: This does NOT verify the signature. Use `Verifier::verify` for that.
    pub fn extract(&self) -> Result<T> {
        let payload = self
            .cose
            .payload
            .as_ref()
            .ok_or(InvocationError::MissingField("payload".into()))?;
        T::from_bytes(payload)
    }

    /// Verify the envelope against the DID named in its key id
    ///
    /// Returns the signer's DID together with the payload.
    pub fn verify_self_describing(&self) -> Result<(Did, T)> {
        let kid = self
            .kid()
            .ok_or_else(|| InvocationError::InvalidSignature("missing key id".into()))?;
        let did = Did::parse(kid)?;
        let payload = Verifier::from_did(&did)?.verify(self)?;
        Ok((did, payload))
    }
}

/// Content identifier of an encoded envelope: unpadded URL-safe base64 of its SHA-256 digest
pub fn content_id(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
}

/// Ed25519 key pair identified by its `did:key`
#[derive(Clone)]
pub struct Signer {
    /// Principal identifier derived from the verifying key
    did: Did,
    /// Ed25519 signing key (private)
    signing_key: SigningKey,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("did", &self.did)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl Signer {
    /// Generate a new random signer
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create a signer from an existing signing key
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let did = Did::from_ed25519(&signing_key.verifying_key());
        Self { did, signing_key }
    }

    /// Create a signer from a raw 32-byte seed
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    /// Get the signer's DID
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// Get the matching verifier
    pub fn verifier(&self) -> Verifier {
        Verifier {
            did: self.did.clone(),
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Get the raw signing key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign a payload and wrap it in COSE_Sign1
    pub fn sign<T: Payload>(&self, payload: &T) -> Result<CoseSigned<T>> {
        let bytes = payload.to_bytes()?;
        let cose = self.sign_cose(&bytes)?;
        Ok(CoseSigned {
            cose,
            _marker: PhantomData,
        })
    }

    /// Sign arbitrary data and wrap in COSE_Sign1
    fn sign_cose(&self, payload: &[u8]) -> Result<CoseSign1> {
        let protected = HeaderBuilder::new()
            .algorithm(EDDSA_ALG)
            .key_id(self.did.as_str().as_bytes().to_vec())
            .build();

        let builder = CoseSign1Builder::new()
            .protected(protected)
            .payload(payload.to_vec());

        let signed_builder = builder.try_create_signature(&[], |data| {
            let signature = self.signing_key.sign(data);
            Ok::<_, InvocationError>(signature.to_bytes().to_vec())
        })?;

        Ok(signed_builder.build())
    }
}

/// Ed25519 public key identified by its `did:key`
#[derive(Clone)]
pub struct Verifier {
    did: Did,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier").field("did", &self.did).finish()
    }
}

impl Verifier {
    /// Derive a verifier from a `did:key`
    pub fn from_did(did: &Did) -> Result<Self> {
        let verifying_key = did.ed25519_key()?;
        Ok(Self {
            did: did.clone(),
            verifying_key,
        })
    }

    /// Get the verifier's DID
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// Get the raw verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Verify a signed envelope and extract the payload
    pub fn verify<T: Payload>(&self, signed: &CoseSigned<T>) -> Result<T> {
        self.verify_cose(&signed.cose)?;
        signed.extract()
    }

    /// Verify a COSE_Sign1 structure
    fn verify_cose(&self, cose: &CoseSign1) -> Result<()> {
        let kid = &cose.protected.header.key_id;
        if !kid.is_empty() {
            let kid_str = String::from_utf8_lossy(kid);
            if kid_str != self.did.as_str() {
                return Err(InvocationError::InvalidSignature(format!(
                    "Key ID mismatch: expected '{}', got '{}'",
                    self.did, kid_str
                )));
            }
        }

        let sig_structure = cose.tbs_data(&[]);

        let signature_bytes: [u8; 64] = cose
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| InvocationError::InvalidSignature("Invalid signature length".into()))?;
        let signature = Signature::from_bytes(&signature_bytes);

        self.verifying_key
            .verify(&sig_structure, &signature)
            .map_err(|e| InvocationError::InvalidSignature(e.to_string()))
    }
}
