//! Invocation Server
//!
//! An HTTP fixture that serves one capability, `test/echo`, over signed
//! invocations. It is meant to be started by a test harness in another
//! process:
//!
//! 1. The server generates a fresh Ed25519 identity and binds an ephemeral port
//! 2. It prints `{"id":"<did>","url":"http://127.0.0.1:<port>"}` on one line
//! 3. The harness posts invocation envelopes and reads signed receipts
//! 4. The harness hits `/shutdown`; the listener closes after a grace delay
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check with the server DID
//! - `ANY /shutdown` - Request shutdown (202)
//! - `POST /` (or any other path) - Invocation envelope in, receipt envelope out

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod service;

pub use api::{create_router, AppState};
pub use config::ServerConfig;
pub use dispatch::{HttpRequest, HttpResponse, InvocationServer};
pub use error::{ConfigError, DispatchError, ServerError, ServiceError};
pub use lifecycle::{serve, start, Announcement, LifecycleState, RunningServer, ShutdownController};
pub use service::echo::{create_server, echo_capability, EchoCaveats, EchoHandler, EchoSuccess, ECHO_ABILITY};
pub use service::{CapabilityHandler, InvocationContext, Service, ServiceBuilder, ServiceMethod};
