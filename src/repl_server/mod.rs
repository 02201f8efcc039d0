//! Embeddable REPL server
//!
//! A process-embeddable read-eval-print loop over TCP. The embedding
//! application owns one [`ReplServer`] per port it wants to serve; instances
//! share nothing and can run side by side.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │ ReplServer (control facade)                                           │
//! │   start() / stop() ── serialized by lifecycle lock                    │
//! │   running() / listen_port() ── read from ControlState at any time     │
//! │                                                                       │
//! │   ┌───────────────────────────────────────────────────────────────┐   │
//! │   │ accept loop (listener.rs)                                      │   │
//! │   │   TcpListener ──► handle_connection per client (JoinSet)       │   │
//! │   │                      │                                         │   │
//! │   │                      ├─ SessionGuard ──► SessionRegistry       │   │
//! │   │                      └─ Session ──► Evaluator (blocking pool)  │   │
//! │   └───────────────────────────────────────────────────────────────┘   │
//! │                                                                       │
//! │   events: broadcast<ServerEvent> ──► UI / logging subscribers         │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # State machine
//!
//! ```text
//! Stopped ──start()──► Starting ──bind ok──► Running ──stop()──► Stopping ──► Stopped
//!                          └──bind error──► Stopped      └──listener fault──► Stopped
//! ```
//!
//! `running()` is true only in `Running`. The listen port can only be
//! changed in `Stopped`.

pub mod connection;
pub mod events;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::{validate_port, ServerConfig};
use crate::error::{ReplError, Result};
use crate::evaluator::Evaluator;

pub use connection::ConnectionContext;
pub use events::{ServerEvent, ServerStatus, EVENT_CHANNEL_CAPACITY};
pub use listener::{Acceptor, RunningServer};
pub use registry::SessionRegistry;
pub use session::{Session, SessionId};

/// Lifecycle phase of a server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Mutable control state shared between the facade and the accept loop
#[derive(Debug)]
pub struct ControlState {
    config: ServerConfig,
    phase: Phase,
    local_addr: Option<SocketAddr>,
}

impl ControlState {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            phase: Phase::Stopped,
            local_addr: None,
        }
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.phase = Phase::Stopped;
        self.local_addr = None;
    }
}

/// Control facade for one REPL server
///
/// `start` and `stop` touch the network; everything else only reads or
/// writes in-memory state and may be called from any thread.
pub struct ReplServer {
    control: Arc<Mutex<ControlState>>,
    lifecycle: tokio::sync::Mutex<Option<RunningServer>>,
    registry: Arc<SessionRegistry>,
    evaluator: Arc<dyn Evaluator>,
    events: broadcast::Sender<ServerEvent>,
}

impl ReplServer {
    /// Create a stopped server; nothing is bound until [`start`](Self::start)
    pub fn new(config: ServerConfig, evaluator: Arc<dyn Evaluator>) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            control: Arc::new(Mutex::new(ControlState::new(config))),
            lifecycle: tokio::sync::Mutex::new(None),
            registry: Arc::new(SessionRegistry::new()),
            evaluator,
            events,
        })
    }

    /// Create a stopped server listening on `port` with default settings
    pub fn with_port(port: i64, evaluator: Arc<dyn Evaluator>) -> Result<Self> {
        Self::new(ServerConfig::with_port(port)?, evaluator)
    }

    /// Bind the listener and begin accepting connections
    ///
    /// Idempotent while running. On a bind failure the server stays stopped
    /// and the error is returned; nothing is retried.
    pub async fn start(&self) -> Result<()> {
        self.start_with_acceptor(|socket| socket).await
    }

    /// `start` with the bound socket wrapped before the accept loop uses it
    pub(crate) async fn start_with_acceptor<A, F>(&self, wrap: F) -> Result<()>
    where
        A: Acceptor,
        F: FnOnce(TcpListener) -> A,
    {
        let mut lifecycle = self.lifecycle.lock().await;

        if let Some(previous) = lifecycle.take() {
            if self.control.lock().phase == Phase::Running && !previous.is_finished() {
                *lifecycle = Some(previous);
                tracing::debug!("start() ignored: already running");
                return Ok(());
            }
            // The accept loop stopped on its own; reap it before rebinding
            previous.shutdown().await;
        }

        let config = {
            let mut state = self.control.lock();
            state.phase = Phase::Starting;
            state.config.clone()
        };
        let addr = config.socket_addr();
        tracing::info!("Starting REPL server on {}", addr);

        let bound = listener::bind(addr)
            .await
            .and_then(|socket| Ok((socket.local_addr()?, socket)));
        let (local_addr, socket) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                tracing::error!("REPL server failed to start: {}", e);
                self.control.lock().mark_stopped();
                return Err(e);
            }
        };

        let ctx = Arc::new(ConnectionContext {
            evaluator: Arc::clone(&self.evaluator),
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
            prompt: config.prompt.clone(),
            banner: config.banner.clone(),
            eval_timeout: config.eval_timeout_duration(),
        });

        // Published before the loop exists; a loop that faults at once must
        // be the last writer
        {
            let mut state = self.control.lock();
            state.phase = Phase::Running;
            state.local_addr = Some(local_addr);
        }
        let _ = self.events.send(ServerEvent::Started { addr: local_addr });

        let running = listener::spawn(wrap(socket), local_addr, ctx, Arc::clone(&self.control));
        *lifecycle = Some(running);

        tracing::info!("REPL server running on {}", local_addr);
        Ok(())
    }

    /// Stop accepting, close every session and release the listener
    ///
    /// Idempotent while stopped. Returns only after all session resources
    /// are released; teardown problems are logged, not returned.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        let Some(running) = lifecycle.take() else {
            tracing::debug!("stop() ignored: not running");
            return Ok(());
        };

        let was_running = {
            let mut state = self.control.lock();
            let was_running = state.phase == Phase::Running;
            if was_running {
                state.phase = Phase::Stopping;
            }
            was_running
        };

        let addr = running.local_addr;
        tracing::info!("Stopping REPL server on {}", addr);
        running.shutdown().await;

        self.control.lock().mark_stopped();
        // A fault already reported Stopped for a loop that ended by itself
        if was_running {
            let _ = self.events.send(ServerEvent::Stopped);
        }
        tracing::info!("REPL server on {} stopped", addr);
        Ok(())
    }

    /// Whether the server is accepting connections
    pub fn running(&self) -> bool {
        self.control.lock().phase == Phase::Running
    }

    pub fn status(&self) -> ServerStatus {
        if self.running() {
            ServerStatus::Running
        } else {
            ServerStatus::Stopped
        }
    }

    pub fn phase(&self) -> Phase {
        self.control.lock().phase
    }

    pub fn listen_port(&self) -> u16 {
        self.control.lock().config.listen_port
    }

    /// Change the listen port; only allowed while fully stopped
    pub fn set_listen_port(&self, port: i64) -> Result<()> {
        let port = validate_port(port)?;
        let mut state = self.control.lock();
        if state.phase != Phase::Stopped {
            return Err(ReplError::invalid_state(format!(
                "cannot change listen port while {:?}",
                state.phase
            )));
        }
        state.config.listen_port = port;
        Ok(())
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> ServerConfig {
        self.control.lock().config.clone()
    }

    /// Address the listener is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.control.lock().local_addr
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    /// Receive lifecycle and session events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for ReplServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.control.lock();
        f.debug_struct("ReplServer")
            .field("listen_port", &state.config.listen_port)
            .field("phase", &state.phase)
            .field("local_addr", &state.local_addr)
            .field("sessions", &self.registry.len())
            .finish()
    }
}
