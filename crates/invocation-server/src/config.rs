//! Server configuration
//!
//! Read from `INVOCATION_SERVER_*` environment variables. Unset variables fall
//! back to defaults; set but unparsable ones are errors.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::Level;

use crate::error::ConfigError;

const HOST_VAR: &str = "INVOCATION_SERVER_HOST";
const PORT_VAR: &str = "INVOCATION_SERVER_PORT";
const GRACE_VAR: &str = "INVOCATION_SERVER_SHUTDOWN_GRACE_MS";
const LOG_LEVEL_VAR: &str = "INVOCATION_SERVER_LOG_LEVEL";

/// Delay between a shutdown request and the listener closing
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: IpAddr,
    /// Port to bind; 0 lets the OS pick one
    pub port: u16,
    /// Delay between `/shutdown` and the listener closing
    pub shutdown_grace: Duration,
    /// Maximum log level
    pub log_level: Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            log_level: Level::INFO,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = match lookup(HOST_VAR) {
            Some(value) => value.parse().map_err(|_| invalid(HOST_VAR, value, "an IP address"))?,
            None => defaults.host,
        };

        let port = match lookup(PORT_VAR) {
            Some(value) => value.parse().map_err(|_| invalid(PORT_VAR, value, "a port number"))?,
            None => defaults.port,
        };

        let shutdown_grace = match lookup(GRACE_VAR) {
            Some(value) => value
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| invalid(GRACE_VAR, value, "a number of milliseconds"))?,
            None => defaults.shutdown_grace,
        };

        let log_level = match lookup(LOG_LEVEL_VAR) {
            Some(value) => value
                .parse()
                .map_err(|_| invalid(LOG_LEVEL_VAR, value, "one of trace, debug, info, warn, error"))?,
            None => defaults.log_level,
        };

        Ok(Self {
            host,
            port,
            shutdown_grace,
            log_level,
        })
    }

    /// Override the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the shutdown grace delay
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Address to bind
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn invalid(var: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError::Invalid { var, value, expected }
}
