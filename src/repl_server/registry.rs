//! Registry of active sessions
//!
//! The accept loop inserts, and each session removes itself on teardown, from
//! different tasks. All access goes through one `parking_lot::Mutex`; the lock
//! is never held across an await point.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::events::ServerEvent;
use super::session::SessionId;

/// Bookkeeping for one active session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub peer: SocketAddr,
    pub opened_at: Instant,
}

/// Set of sessions whose connections are currently open
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: SessionId, peer: SocketAddr) {
        self.sessions.lock().insert(
            id,
            SessionEntry {
                peer,
                opened_at: Instant::now(),
            },
        );
    }

    /// Remove a session, returning its entry if it was present
    pub fn remove(&self, id: &SessionId) -> Option<SessionEntry> {
        self.sessions.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Drop every entry, returning how many were left
    pub fn clear(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let count = sessions.len();
        sessions.clear();
        count
    }
}

/// Registration of one session, removed from the registry when dropped
///
/// Held by the connection task for its whole lifetime, so the entry goes
/// away on every exit path, including a panicking evaluator task.
pub struct SessionGuard {
    id: SessionId,
    registry: Arc<SessionRegistry>,
    events: broadcast::Sender<ServerEvent>,
}

impl SessionGuard {
    pub fn register(
        registry: Arc<SessionRegistry>,
        events: broadcast::Sender<ServerEvent>,
        id: SessionId,
        peer: SocketAddr,
    ) -> Self {
        registry.insert(id, peer);
        let _ = events.send(ServerEvent::SessionOpened { id, peer });
        Self {
            id,
            registry,
            events,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.registry.remove(&self.id) {
            tracing::debug!(
                "Session {} from {} unregistered after {:?}",
                self.id,
                entry.peer,
                entry.opened_at.elapsed()
            );
            let _ = self.events.send(ServerEvent::SessionClosed { id: self.id });
        }
    }
}
