//! Capability registry
//!
//! A service maps ability names to handlers. Each handler is registered
//! together with the descriptor of its capability; the descriptor's caveat
//! type and the handler's argument type are the same type parameter, so a
//! shape mismatch does not compile. What can still go wrong at registration
//! (malformed or duplicate ability names) is reported by
//! `ServiceBuilder::build`.

pub mod echo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use invocation_core::capability::validate_ability;
use invocation_core::{
    access, CapabilityDescriptor, Caveats, Did, Failure, Invocation, Outcome, ParsedCapability,
    ValidationContext,
};

use crate::error::ServiceError;

/// Per-invocation information handed to handlers
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// DID of the service executing the invocation
    pub id: Did,
    /// Content id of the invocation
    pub invocation_id: String,
    /// When the request carrying the invocation was received
    pub received_at: DateTime<Utc>,
}

/// Handler for one capability
///
/// Handlers only ever see invocations that passed validation.
#[async_trait]
pub trait CapabilityHandler: Send + Sync + 'static {
    /// Caveat shape accepted by this handler
    type Caveats: Caveats;

    /// Success value returned to the invoker
    type Success: Serialize + Send;

    /// Execute an authorized invocation
    async fn handle(
        &self,
        capability: ParsedCapability<Self::Caveats>,
        invocation: &Invocation,
        ctx: &InvocationContext,
    ) -> Result<Self::Success, Failure>;
}

/// Type-erased registry entry: validation followed by execution
#[async_trait]
pub trait ServiceMethod: Send + Sync {
    /// Ability served by this method
    fn can(&self) -> &str;

    /// Validate and execute an invocation, producing its outcome
    async fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext) -> Outcome;
}

/// A handler bound to its capability descriptor
struct Provided<H: CapabilityHandler> {
    descriptor: CapabilityDescriptor<H::Caveats>,
    handler: H,
}

#[async_trait]
impl<H: CapabilityHandler> ServiceMethod for Provided<H> {
    fn can(&self) -> &str {
        self.descriptor.can()
    }

    async fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext) -> Outcome {
        let validation = ValidationContext::new(ctx.id.clone()).at(ctx.received_at);

        let authorization = match access(invocation, &self.descriptor, &validation) {
            Ok(authorization) => authorization,
            Err(e) => {
                debug!(invocation = %ctx.invocation_id, error = %e, "Invocation rejected");
                return Outcome::Error(Failure::from(&e));
            }
        };

        match self.handler.handle(authorization.capability, invocation, ctx).await {
            Ok(success) => match serde_json::to_value(success) {
                Ok(value) => Outcome::Ok(value),
                Err(e) => Outcome::Error(Failure::handler(format!("Failed to encode result: {}", e))),
            },
            Err(failure) => Outcome::Error(failure),
        }
    }
}

/// Registered capability handlers, keyed by ability
#[derive(Clone)]
pub struct Service {
    methods: HashMap<String, Arc<dyn ServiceMethod>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("abilities", &self.abilities())
            .finish()
    }
}

impl Service {
    /// Start building a service
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    /// Look up the method serving `can`
    pub fn get(&self, can: &str) -> Option<Arc<dyn ServiceMethod>> {
        self.methods.get(can).cloned()
    }

    /// Check whether `can` is served
    pub fn has(&self, can: &str) -> bool {
        self.methods.contains_key(can)
    }

    /// List served abilities, sorted
    pub fn abilities(&self) -> Vec<String> {
        let mut abilities: Vec<String> = self.methods.keys().cloned().collect();
        abilities.sort();
        abilities
    }
}

/// Builder collecting capability registrations
#[derive(Default)]
pub struct ServiceBuilder {
    methods: Vec<Arc<dyn ServiceMethod>>,
}

impl ServiceBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the capability described by `descriptor`
    pub fn provide<H: CapabilityHandler>(mut self, descriptor: CapabilityDescriptor<H::Caveats>, handler: H) -> Self {
        self.methods.push(Arc::new(Provided { descriptor, handler }));
        self
    }

    /// Validate registrations and build the service
    pub fn build(self) -> Result<Service, ServiceError> {
        if self.methods.is_empty() {
            return Err(ServiceError::Empty);
        }

        let mut methods = HashMap::with_capacity(self.methods.len());

        for method in self.methods {
            let can = method.can().to_string();

            validate_ability(&can).map_err(|reason| ServiceError::InvalidAbility {
                can: can.clone(),
                reason,
            })?;

            if methods.contains_key(&can) {
                return Err(ServiceError::DuplicateAbility(can));
            }

            info!(can = %can, "Registered capability handler");
            methods.insert(can, method);
        }

        Ok(Service { methods })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invocation_core::{default_derives, Capability, ResourceSchema, Signer, UcanBuilder};
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Shout {
        text: String,
    }

    struct ShoutHandler;

    #[async_trait]
    impl CapabilityHandler for ShoutHandler {
        type Caveats = Shout;
        type Success = Shout;

        async fn handle(
            &self,
            capability: ParsedCapability<Shout>,
            _invocation: &Invocation,
            _ctx: &InvocationContext,
        ) -> Result<Shout, Failure> {
            if capability.nb.text.is_empty() {
                return Err(Failure::handler("nothing to shout"));
            }
            Ok(Shout {
                text: capability.nb.text.to_uppercase(),
            })
        }
    }

    fn shout(can: &str) -> CapabilityDescriptor<Shout> {
        CapabilityDescriptor::new(can, ResourceSchema::DidString, default_derives)
    }

    fn context(service: &Signer, invocation: &Invocation) -> InvocationContext {
        InvocationContext {
            id: service.did().clone(),
            invocation_id: invocation.id(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_registers_abilities() {
        let service = Service::builder()
            .provide(shout("test/shout"), ShoutHandler)
            .provide(shout("test/yell"), ShoutHandler)
            .build()
            .unwrap();

        assert!(service.has("test/shout"));
        assert!(!service.has("test/whisper"));
        assert_eq!(service.abilities(), vec!["test/shout", "test/yell"]);
    }

    #[test]
    fn test_duplicate_ability_rejected() {
        let result = Service::builder()
            .provide(shout("test/shout"), ShoutHandler)
            .provide(shout("test/shout"), ShoutHandler)
            .build();

        assert!(matches!(result, Err(ServiceError::DuplicateAbility(_))));
    }

    #[test]
    fn test_invalid_ability_rejected() {
        for can in ["shout", "test/*", ""] {
            let result = Service::builder().provide(shout(can), ShoutHandler).build();
            assert!(
                matches!(result, Err(ServiceError::InvalidAbility { .. })),
                "expected '{}' to be rejected",
                can
            );
        }
    }

    #[test]
    fn test_empty_service_rejected() {
        assert!(matches!(Service::builder().build(), Err(ServiceError::Empty)));
    }

    #[tokio::test]
    async fn test_method_validates_then_handles() {
        let signer = Signer::generate();
        let alice = Signer::generate();
        let service = Service::builder()
            .provide(shout("test/shout"), ShoutHandler)
            .build()
            .unwrap();
        let method = service.get("test/shout").unwrap();

        let invocation = UcanBuilder::new(&alice)
            .audience(signer.did().clone())
            .capability(Capability::new("test/shout", alice.did().as_str()).with_caveat("text", "hey"))
            .invoke()
            .unwrap();

        let outcome = method.invoke(&invocation, &context(&signer, &invocation)).await;
        assert_eq!(outcome.ok(), Some(&serde_json::json!({ "text": "HEY" })));
    }

    #[tokio::test]
    async fn test_method_reports_handler_failure() {
        let signer = Signer::generate();
        let service = Service::builder()
            .provide(shout("test/shout"), ShoutHandler)
            .build()
            .unwrap();
        let method = service.get("test/shout").unwrap();

        let invocation = UcanBuilder::new(&signer)
            .audience(signer.did().clone())
            .capability(Capability::new("test/shout", signer.did().as_str()).with_caveat("text", ""))
            .invoke()
            .unwrap();

        let outcome = method.invoke(&invocation, &context(&signer, &invocation)).await;
        assert_eq!(outcome.error().map(|f| f.name.as_str()), Some("HandlerExecutionError"));
    }

    #[tokio::test]
    async fn test_method_reports_validation_failure() {
        let signer = Signer::generate();
        let alice = Signer::generate();
        let service = Service::builder()
            .provide(shout("test/shout"), ShoutHandler)
            .build()
            .unwrap();
        let method = service.get("test/shout").unwrap();

        // Addressed to someone else
        let invocation = UcanBuilder::new(&alice)
            .audience(alice.did().clone())
            .capability(Capability::new("test/shout", alice.did().as_str()).with_caveat("text", "hey"))
            .invoke()
            .unwrap();

        let outcome = method.invoke(&invocation, &context(&signer, &invocation)).await;
        assert_eq!(outcome.error().map(|f| f.name.as_str()), Some("InvalidAudience"));
    }
}
