//! The `test/echo` capability
//!
//! Returns its single string caveat unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use invocation_core::{
    default_derives, CapabilityDescriptor, Failure, Invocation, ParsedCapability, ResourceSchema,
    Signer,
};

use super::{CapabilityHandler, InvocationContext, Service};
use crate::dispatch::InvocationServer;
use crate::error::ServiceError;

/// Ability served by the echo handler
pub const ECHO_ABILITY: &str = "test/echo";

/// Arguments of `test/echo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EchoCaveats {
    pub echo: String,
}

/// Result of `test/echo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoSuccess {
    pub echo: String,
}

/// Descriptor of `test/echo`: any DID resource, default derivation
pub fn echo_capability() -> CapabilityDescriptor<EchoCaveats> {
    CapabilityDescriptor::new(ECHO_ABILITY, ResourceSchema::DidString, default_derives)
}

/// Handler for `test/echo`
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl CapabilityHandler for EchoHandler {
    type Caveats = EchoCaveats;
    type Success = EchoSuccess;

    async fn handle(
        &self,
        capability: ParsedCapability<EchoCaveats>,
        _invocation: &Invocation,
        _ctx: &InvocationContext,
    ) -> Result<EchoSuccess, Failure> {
        Ok(EchoSuccess {
            echo: capability.nb.echo,
        })
    }
}

/// Build a server exposing `test/echo`, signing receipts as `signer`
pub fn create_server(signer: Signer) -> Result<InvocationServer, ServiceError> {
    let service = Service::builder()
        .provide(echo_capability(), EchoHandler)
        .build()?;

    Ok(InvocationServer::new(signer, service))
}
