//! Server core: listening socket and accept loop
//!
//! # Shutdown order
//!
//! 1. The control side signals the accept loop (or the loop hits a fatal
//!    listener error on its own).
//! 2. The listener is dropped, so no further connections are accepted.
//! 3. Every session is signalled and closes its stream.
//! 4. The loop waits for every session task to finish before returning.
//!
//! Only after step 4 does `stop()` report the server as stopped.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use super::connection::{handle_connection, ConnectionContext};
use super::events::ServerEvent;
use super::ControlState;
use crate::error::{ReplError, Result};

/// Back-off after running out of file descriptors or buffers
const RESOURCE_BACKOFF: Duration = Duration::from_millis(100);

/// Source of incoming connections for the accept loop
///
/// Implemented for `TcpListener`; wrappers can intercept `accept` to observe
/// or fail it.
pub trait Acceptor: Send + 'static {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + '_;
}

impl Acceptor for TcpListener {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + '_ {
        TcpListener::accept(self)
    }
}

/// Handle to a running accept loop
pub struct RunningServer {
    pub local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RunningServer {
    /// Whether the accept loop has already exited on its own
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the accept loop and wait until it and every session are gone
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Accept loop for {} ended abnormally: {}", self.local_addr, e);
        }
    }
}

/// Bind the listening socket
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ReplError::Bind { addr, source })
}

/// Spawn the accept loop for an already bound acceptor
///
/// The caller publishes the running state before calling this, so a loop
/// that fails at once still leaves the server marked stopped.
pub fn spawn<A: Acceptor>(
    acceptor: A,
    local_addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
    control: Arc<Mutex<ControlState>>,
) -> RunningServer {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(accept_loop(acceptor, local_addr, ctx, control, shutdown_rx));
    RunningServer {
        local_addr,
        shutdown: shutdown_tx,
        task,
    }
}

/// Why the accept loop stopped
enum LoopExit {
    Requested,
    Fatal(io::Error),
}

async fn accept_loop<A: Acceptor>(
    mut acceptor: A,
    addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
    control: Arc<Mutex<ControlState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (sessions_tx, sessions_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();

    tracing::info!("REPL server accepting on {}", addr);

    let exit = loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break LoopExit::Requested,

            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("Session task failed: {}", e);
                }
            }

            accepted = acceptor.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("Accepted connection from {}", peer);
                    sessions.spawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&ctx),
                        sessions_rx.clone(),
                    ));
                }
                Err(e) if is_transient_accept_error(&e) => {
                    tracing::warn!("Transient accept error on {}: {}", addr, e);
                    if is_resource_exhaustion(&e) {
                        tokio::time::sleep(RESOURCE_BACKOFF).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Listener on {} failed: {}", addr, e);
                    break LoopExit::Fatal(e);
                }
            },
        }
    };

    // Close the listener before touching sessions so nothing new arrives
    drop(acceptor);

    let open = sessions.len();
    if open > 0 {
        tracing::info!("Closing {} active session(s)", open);
    }
    let _ = sessions_tx.send(true);
    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Session task failed during shutdown: {}", e);
        }
    }

    let leftover = ctx.registry.clear();
    if leftover > 0 {
        tracing::warn!("{} session(s) were still registered after teardown", leftover);
    }

    match exit {
        LoopExit::Requested => {
            tracing::info!("REPL server on {} stopped accepting", addr);
        }
        LoopExit::Fatal(e) => {
            {
                let mut state = control.lock();
                state.mark_stopped();
            }
            let _ = ctx.events.send(ServerEvent::Fault {
                message: e.to_string(),
            });
            let _ = ctx.events.send(ServerEvent::Stopped);
            tracing::warn!("REPL server on {} stopped after listener fault", addr);
        }
    }
}

/// Accept errors caused by a single connection or momentary pressure
///
/// Anything else means the listening socket itself is unusable.
pub fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::OutOfMemory
    ) || is_resource_exhaustion(e)
}

/// Out of memory, descriptors or socket buffers
///
/// `io::ErrorKind` has no stable kinds for EMFILE, ENFILE or ENOBUFS, so
/// those are matched on the raw code.
fn is_resource_exhaustion(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}
