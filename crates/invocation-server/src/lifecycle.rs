//! Server lifecycle
//!
//! `Starting → Listening → ShuttingDown → Stopped`
//!
//! The server binds, announces `{"id","url"}` on one line, and serves until
//! `/shutdown` starts the close timer. When the timer fires the listener is
//! closed; requests already accepted are allowed to finish.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use invocation_core::{Did, Signer};

use crate::api::{create_router, AppState};
use crate::config::ServerConfig;
use crate::dispatch::InvocationServer;
use crate::error::ServerError;
use crate::service::echo::create_server;

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Startup announcement written once the listener is bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// DID of the server
    pub id: String,
    /// Base URL of the listener
    pub url: String,
}

/// A pending close timer
///
/// `settled` is claimed exactly once, either by the timer when it fires or
/// by `cancel`.
struct CloseTimer {
    handle: JoinHandle<()>,
    settled: Arc<AtomicBool>,
}

/// Owns the delayed-close timer and the lifecycle state
pub struct ShutdownController {
    grace: Duration,
    state: watch::Sender<LifecycleState>,
    close: Arc<Notify>,
    timer: Mutex<Option<CloseTimer>>,
}

impl std::fmt::Debug for ShutdownController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownController")
            .field("grace", &self.grace)
            .field("state", &self.state())
            .finish()
    }
}

impl ShutdownController {
    /// Create a controller in the `Starting` state
    pub fn new(grace: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            grace,
            state,
            close: Arc::new(Notify::new()),
            timer: Mutex::new(None),
        }
    }

    /// Delay between a shutdown request and the listener closing
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = self.state.send_replace(state);
        debug!(from = ?previous, to = ?state, "Lifecycle transition");
    }

    /// Start the close timer
    ///
    /// Returns `false` if shutdown was already requested; the first request's
    /// timer keeps running.
    pub fn trigger(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() {
            return false;
        }

        self.set_state(LifecycleState::ShuttingDown);

        let settled = Arc::new(AtomicBool::new(false));
        let close = Arc::clone(&self.close);
        let fired = Arc::clone(&settled);
        let grace = self.grace;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if !fired.swap(true, Ordering::SeqCst) {
                info!("Closing listener");
                close.notify_one();
            }
        });
        *timer = Some(CloseTimer { handle, settled });

        true
    }

    /// Abort a pending close timer
    ///
    /// Returns `false` if there was no timer or it already fired, in which
    /// case the listener still closes.
    pub fn cancel(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pending) = timer.take() else {
            return false;
        };

        if pending.settled.swap(true, Ordering::SeqCst) {
            *timer = Some(pending);
            return false;
        }

        pending.handle.abort();
        self.set_state(LifecycleState::Listening);
        info!("Shutdown cancelled");
        true
    }

    /// Resolve once the close timer has fired
    pub async fn closed(&self) {
        self.close.notified().await
    }
}

/// A bound, serving server
pub struct RunningServer {
    id: Did,
    addr: SocketAddr,
    shutdown: Arc<ShutdownController>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    /// DID of the server
    pub fn id(&self) -> &Did {
        &self.id
    }

    /// Bound socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients should use
    pub fn url(&self) -> String {
        let ip = if self.addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.addr.ip()
        };
        format!("http://{}", SocketAddr::new(ip, self.addr.port()))
    }

    /// Startup announcement
    pub fn announcement(&self) -> Announcement {
        Announcement {
            id: self.id.to_string(),
            url: self.url(),
        }
    }

    /// Write the announcement as one line of JSON and flush
    pub fn announce<W: Write>(&self, writer: &mut W) -> Result<(), ServerError> {
        let line = serde_json::to_string(&self.announcement()).map_err(|e| ServerError::Announce(e.to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| ServerError::Announce(e.to_string()))?;
        writer.flush().map_err(|e| ServerError::Announce(e.to_string()))
    }

    /// Lifecycle controller
    pub fn shutdown(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }

    /// Wait for the serve loop to end
    pub async fn wait(self) -> Result<(), ServerError> {
        let result = self
            .task
            .await
            .map_err(|e| ServerError::Io(std::io::Error::other(e)))?;

        self.shutdown.set_state(LifecycleState::Stopped);
        info!(id = %self.id, "Server stopped");

        result.map_err(ServerError::from)
    }
}

/// Start a `test/echo` server with a fresh identity
pub async fn start(config: &ServerConfig) -> Result<RunningServer, ServerError> {
    let server = create_server(Signer::generate())?;
    serve(server, config).await
}

/// Bind and serve `server`
pub async fn serve(server: InvocationServer, config: &ServerConfig) -> Result<RunningServer, ServerError> {
    let shutdown = Arc::new(ShutdownController::new(config.shutdown_grace));

    let bind = config.bind_addr();
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind { addr: bind, source })?;
    let addr = listener.local_addr()?;

    let id = server.id().clone();
    let state = Arc::new(AppState {
        server,
        shutdown: Arc::clone(&shutdown),
    });
    let app = create_router(state);

    shutdown.set_state(LifecycleState::Listening);
    info!(id = %id, addr = %addr, "Invocation server listening");

    let signal = Arc::clone(&shutdown);
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.closed().await })
            .await
    });

    Ok(RunningServer {
        id,
        addr,
        shutdown,
        task,
    })
}
