//! Connection registry: the set of live client connections.
//!
//! The registry is the only mutable state shared between the accept loop,
//! the sessions and `stop`.  Every insert, removal and iteration happens under
//! one `std::sync::Mutex`, and no lock is ever held across an `.await`.
//!
//! # Who closes a connection? (for beginners)
//!
//! A connection can end two ways: the peer hangs up (the session notices) or
//! the server stops (the lifecycle closes everything).  Both paths race for
//! the same entry, and the transport must be closed exactly once.
//!
//! The rule is simple: whoever takes the [`ClientConnection`] out of the map
//! owns its closing.  [`ConnectionRegistry::remove`],
//! [`ConnectionRegistry::drain`] and [`ConnectionRegistry::take_all`] all
//! *move* entries out under the lock, so at most one of them ever sees a
//! given entry.
//!
//! The registry does not own the byte stream itself; the session task does.
//! An entry holds the session's close signal and its outbound queue.  Closing
//! an entry fires the signal, which makes the session drop its stream.
//!
//! ```text
//!  accept loop ── insert ──► ┌──────────────┐ ◄── remove ── session (peer closed)
//!                            │  HashMap     │
//!  send ─────── broadcast ─► │  id → entry  │ ◄── drain ─── stop (close all)
//!                            └──────────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pen_core::ConnectionId;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Default maximum number of simultaneous connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 8;

/// Reasons an insert is refused.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The server is stopping; no new connections are accepted.
    #[error("registry is closed")]
    Closed,
    /// The connection limit has been reached.
    #[error("connection limit of {limit} reached")]
    Full { limit: usize },
}

/// Registry entry for one accepted connection.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub remote_address: String,
    close_tx: oneshot::Sender<()>,
    outbound_tx: mpsc::Sender<Arc<str>>,
}

impl ClientConnection {
    pub fn new(
        id: ConnectionId,
        remote_address: String,
        close_tx: oneshot::Sender<()>,
        outbound_tx: mpsc::Sender<Arc<str>>,
    ) -> Self {
        Self {
            id,
            remote_address,
            close_tx,
            outbound_tx,
        }
    }

    /// Tells the owning session to close its transport.  Consumes the entry,
    /// so it cannot be closed twice.
    pub fn close(self) {
        // The session may already be gone; that is the same outcome.
        let _ = self.close_tx.send(());
    }
}

#[derive(Debug, Default)]
struct Inner {
    connections: HashMap<ConnectionId, ClientConnection>,
    closed: bool,
}

/// Thread-safe set of live connections, with a connection limit.
#[derive(Debug)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
    limit: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry that admits at most `limit` connections.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            limit: limit.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the map half-updated:
        // every critical section is a single HashMap call.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configured connection limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Adds a newly accepted connection.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Closed`] once [`drain`](Self::drain) has run.
    /// - [`RegistryError::Full`] when the limit is reached.
    ///
    /// On error the entry is dropped, which also fires its close signal.
    pub fn insert(&self, connection: ClientConnection) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RegistryError::Closed);
        }
        if inner.connections.len() >= self.limit {
            return Err(RegistryError::Full { limit: self.limit });
        }
        inner.connections.insert(connection.id, connection);
        Ok(())
    }

    /// Takes one connection out of the registry.
    ///
    /// Returns `None` if another path (normally [`drain`](Self::drain)) got
    /// there first.
    pub fn remove(&self, id: ConnectionId) -> Option<ClientConnection> {
        self.lock().connections.remove(&id)
    }

    /// Closes the registry to new inserts and takes every entry out of it.
    pub fn drain(&self) -> Vec<ClientConnection> {
        let mut inner = self.lock();
        inner.closed = true;
        inner.connections.drain().map(|(_, c)| c).collect()
    }

    /// Takes every entry out but keeps admitting new connections.
    pub fn take_all(&self) -> Vec<ClientConnection> {
        self.lock().connections.drain().map(|(_, c)| c).collect()
    }

    /// Queues `message` for every registered connection.
    ///
    /// Returns how many connections accepted it.  A connection whose
    /// outbound queue is full or already closed is skipped.
    pub fn broadcast(&self, message: &str) -> usize {
        let message: Arc<str> = Arc::from(message);
        let inner = self.lock();
        inner
            .connections
            .values()
            .filter(|c| c.outbound_tx.try_send(Arc::clone(&message)).is_ok())
            .count()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered connection ids.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.lock().connections.keys().copied().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
