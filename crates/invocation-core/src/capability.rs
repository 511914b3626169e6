//! Capabilities and capability descriptors
//!
//! A capability names an ability (`can`), the resource it applies to
//! (`with`) and optional caveats (`nb`). A descriptor is the server-side
//! schema for one ability: it parses raw capabilities into typed caveats and
//! decides whether a claimed capability may be derived from a delegated one.

use crate::did::Did;
use crate::error::{InvocationError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// A capability as it appears inside a delegation or invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Ability being exercised (e.g. "test/echo")
    pub can: String,

    /// Resource the ability applies to
    pub with: String,

    /// Caveats restricting the ability
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub nb: Map<String, Value>,
}

impl Capability {
    /// Create a capability without caveats
    pub fn new(can: impl Into<String>, with: impl Into<String>) -> Self {
        Self {
            can: can.into(),
            with: with.into(),
            nb: Map::new(),
        }
    }

    /// Add a caveat (builder pattern)
    pub fn with_caveat(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.nb.insert(key.into(), value.into());
        self
    }

    /// Replace the caveats with the serialized form of `caveats`
    ///
    /// Fails if `caveats` does not serialize to a JSON object.
    pub fn with_caveats<C: Serialize>(mut self, caveats: &C) -> Result<Self> {
        match serde_json::to_value(caveats)? {
            Value::Object(nb) => {
                self.nb = nb;
                Ok(self)
            }
            other => Err(InvocationError::MalformedCapability {
                can: self.can,
                reason: format!("caveats must be an object, got {}", other),
            }),
        }
    }

    /// Check whether this capability's ability covers `ability`
    ///
    /// Supports wildcard matching:
    /// - "test/*" covers "test/echo"
    /// - "*" covers everything
    pub fn covers_ability(&self, ability: &str) -> bool {
        ability_covers(&self.can, ability)
    }
}

/// Check whether a delegated ability pattern covers a claimed ability
pub fn ability_covers(pattern: &str, ability: &str) -> bool {
    if pattern == "*" || pattern == ability {
        return true;
    }

    match pattern.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('/') => ability.starts_with(prefix),
        _ => false,
    }
}

/// Check that an ability name is concrete: `namespace/segment`, no wildcards
pub fn validate_ability(ability: &str) -> std::result::Result<(), String> {
    let Some((namespace, segment)) = ability.split_once('/') else {
        return Err(format!("'{}' is not of the form namespace/name", ability));
    };

    if namespace.is_empty() || segment.is_empty() {
        return Err(format!("'{}' has an empty segment", ability));
    }

    if ability.contains('*') {
        return Err(format!("'{}' contains a wildcard", ability));
    }

    if ability.chars().any(char::is_whitespace) {
        return Err(format!("'{}' contains whitespace", ability));
    }

    Ok(())
}

/// Reason a claimed capability cannot be derived from a delegated one
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeriveError {
    /// Claimed resource is outside the delegated resource
    #[error("resource '{claimed}' is not contained in '{delegated}'")]
    ResourceMismatch { claimed: String, delegated: String },

    /// Claimed caveat escalates a delegated caveat
    #[error("caveat '{field}' violation: delegated {delegated}, claimed {claimed}")]
    CaveatViolation {
        field: String,
        delegated: String,
        claimed: String,
    },
}

/// Derivation policy: may `claimed` be derived from `delegated`?
pub type Derives = fn(claimed: &Capability, delegated: &Capability) -> std::result::Result<(), DeriveError>;

/// Default derivation policy
///
/// - `with` must be equal; resources have no wildcard form, since a chain is
///   only rooted where `with` names the issuer itself
/// - every caveat present on the delegated capability must be present and equal on the claimed one
pub fn default_derives(claimed: &Capability, delegated: &Capability) -> std::result::Result<(), DeriveError> {
    if claimed.with != delegated.with {
        return Err(DeriveError::ResourceMismatch {
            claimed: claimed.with.clone(),
            delegated: delegated.with.clone(),
        });
    }

    for (field, delegated_value) in &delegated.nb {
        match claimed.nb.get(field) {
            Some(claimed_value) if claimed_value == delegated_value => {}
            claimed_value => {
                return Err(DeriveError::CaveatViolation {
                    field: field.clone(),
                    delegated: delegated_value.to_string(),
                    claimed: claimed_value.map_or_else(|| "nothing".to_string(), Value::to_string),
                });
            }
        }
    }

    Ok(())
}

/// Shape the `with` of a capability must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSchema {
    /// Any well-formed DID
    DidString,
    /// Any non-empty string
    Any,
}

impl ResourceSchema {
    fn check(&self, with: &str) -> std::result::Result<(), String> {
        match self {
            ResourceSchema::DidString => Did::parse(with).map(|_| ()).map_err(|e| e.to_string()),
            ResourceSchema::Any if with.is_empty() => Err("resource is empty".into()),
            ResourceSchema::Any => Ok(()),
        }
    }
}

/// Marker for typed caveats
pub trait Caveats: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Caveats for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A capability whose caveats have been parsed into `C`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCapability<C> {
    /// Ability
    pub can: String,
    /// Resource
    pub with: String,
    /// Typed caveats
    pub nb: C,
}

impl<C> ParsedCapability<C> {
    /// Get the typed caveats
    pub fn nb(&self) -> &C {
        &self.nb
    }
}

/// Server-side schema of a single ability
pub struct CapabilityDescriptor<C> {
    can: String,
    with: ResourceSchema,
    derives: Derives,
    _caveats: PhantomData<fn() -> C>,
}

impl<C> Clone for CapabilityDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            can: self.can.clone(),
            with: self.with,
            derives: self.derives,
            _caveats: PhantomData,
        }
    }
}

impl<C> fmt::Debug for CapabilityDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("can", &self.can)
            .field("with", &self.with)
            .field("caveats", &std::any::type_name::<C>())
            .finish()
    }
}

impl<C: Caveats> CapabilityDescriptor<C> {
    /// Create a descriptor
    pub fn new(can: impl Into<String>, with: ResourceSchema, derives: Derives) -> Self {
        Self {
            can: can.into(),
            with,
            derives,
            _caveats: PhantomData,
        }
    }

    /// Ability described
    pub fn can(&self) -> &str {
        &self.can
    }

    /// Resource schema
    pub fn resource_schema(&self) -> ResourceSchema {
        self.with
    }

    /// Apply the derivation policy
    pub fn derives(&self, claimed: &Capability, delegated: &Capability) -> std::result::Result<(), DeriveError> {
        (self.derives)(claimed, delegated)
    }

    /// Parse a raw capability into typed caveats
    pub fn parse(&self, capability: &Capability) -> Result<ParsedCapability<C>> {
        let malformed = |reason: String| InvocationError::MalformedCapability {
            can: capability.can.clone(),
            reason,
        };

        if capability.can != self.can {
            return Err(malformed(format!("expected ability '{}'", self.can)));
        }

        self.with.check(&capability.with).map_err(malformed)?;

        let nb = serde_json::from_value(Value::Object(capability.nb.clone()))
            .map_err(|e| malformed(format!("invalid caveats: {}", e)))?;

        Ok(ParsedCapability {
            can: capability.can.clone(),
            with: capability.with.clone(),
            nb,
        })
    }
}
