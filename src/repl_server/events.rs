//! Server lifecycle notifications
//!
//! Embedding applications (a UI showing a start/stop toggle, a log view)
//! subscribe to these instead of polling `running()`. Events are delivered
//! over a `tokio::sync::broadcast` channel; a lagging subscriber loses the
//! oldest events, never blocks the server.

use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;

use super::session::SessionId;

/// Capacity of the event channel per subscriber
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification emitted by a running server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Listener bound and accepting
    Started { addr: SocketAddr },
    /// Server returned to the stopped state
    Stopped,
    /// Listener failed while running; a `Stopped` event follows
    Fault { message: String },
    SessionOpened { id: SessionId, peer: SocketAddr },
    SessionClosed { id: SessionId },
}

/// Coarse run state, rendered as `RUNNING` / `STOPPED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Running,
    Stopped,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("RUNNING"),
            Self::Stopped => f.write_str("STOPPED"),
        }
    }
}
