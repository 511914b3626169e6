//! Server error types

use std::net::SocketAddr;
use thiserror::Error;

use invocation_core::InvocationError;

/// Errors raised while assembling a service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service has no capability handlers")]
    Empty,

    #[error("Invalid ability '{can}': {reason}")]
    InvalidAbility { can: String, reason: String },

    #[error("Ability '{0}' is registered more than once")]
    DuplicateAbility(String),
}

/// Errors raised while dispatching a request
///
/// These are transport-level failures; anything an invoker did wrong is
/// reported in a receipt or a 4xx response instead.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No handler for ability '{0}'")]
    HandlerNotFound(String),

    #[error("Failed to sign receipt: {0}")]
    Signing(#[source] InvocationError),

    #[error("Failed to encode response: {0}")]
    Encode(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Fatal startup and runtime errors of the server process
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write announcement: {0}")]
    Announce(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}
