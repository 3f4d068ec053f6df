//! Connection accounting with an enforced concurrency bound.
//!
//! [`ConnectionRegistry`] tracks the set of currently attached sessions and
//! refuses admissions beyond `max_connections`. Check-and-insert happens
//! under a single write lock, so two near-simultaneous connections can
//! never race the registry past the bound.

use std::collections::HashSet;

use tokio::sync::RwLock;

use super::SessionId;

/// Shared registry of active WebSocket sessions.
///
/// One instance lives for the process lifetime and is shared by the
/// dispatcher and every session. All mutation goes through [`try_admit`]
/// and [`release`]; nothing bypasses the registry.
///
/// [`try_admit`]: ConnectionRegistry::try_admit
/// [`release`]: ConnectionRegistry::release
#[derive(Debug)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashSet<SessionId>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry bounded at `max_connections` sessions.
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            sessions: RwLock::new(HashSet::new()),
            max_connections,
        }
    }

    /// Atomically admits a session if the registry is under capacity.
    ///
    /// Returns `false` when the registry is full; the caller must then
    /// refuse the connection without ever counting it. Capacity refusal is
    /// a normal outcome, not an error.
    pub async fn try_admit(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_connections {
            return false;
        }
        sessions.insert(id)
    }

    /// Removes a session from the registry.
    ///
    /// Idempotent: releasing twice, or releasing a session that was never
    /// admitted, is a no-op. Returns `true` if the session was present.
    pub async fn release(&self, id: SessionId) -> bool {
        self.sessions.write().await.remove(&id)
    }

    /// Returns a snapshot of the current active session count.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns the configured capacity bound.
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }
}
