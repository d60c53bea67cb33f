//! Bounded sink for outward [`ServerEvent`] notifications.
//!
//! Every component that reports something to the host (lifecycle, accept
//! loop, sessions, the dispatch worker) holds a clone of one [`EventSink`].
//! Emitting never waits: the host may be the same task that is currently
//! calling `stop`, so a full queue drops the notification instead of
//! stalling the server.  Drops are counted and reported by a warning at most
//! once per [`DROP_WARN_INTERVAL`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use pen_core::ServerEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Default depth of the notification queue.
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 1024;

/// Minimum gap between two "queue full" warnings.
pub const DROP_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Dropped-notification count shared by every clone of a sink.
#[derive(Debug, Default)]
struct DropTally {
    pending: AtomicU64,
    last_warn: Mutex<Option<Instant>>,
}

impl DropTally {
    /// Counts one drop.  Returns the drops since the previous warning when a
    /// new warning is due.
    fn record(&self) -> Option<u64> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut last = self.last_warn.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|at| now.duration_since(at) < DROP_WARN_INTERVAL) {
            return None;
        }
        *last = Some(now);
        Some(self.pending.swap(0, Ordering::Relaxed))
    }
}

/// Cloneable producer side of the notification queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ServerEvent>,
    drops: Arc<DropTally>,
}

impl EventSink {
    /// Creates a sink and the receiver the host reads notifications from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                drops: Arc::default(),
            },
            rx,
        )
    }

    /// Queues `event` for the host without waiting.
    pub fn emit(&self, event: ServerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => match self.drops.record() {
                Some(dropped) => {
                    warn!("notification queue full; dropped {dropped} notification(s), latest {event:?}");
                }
                None => debug!("notification queue full; dropping {event:?}"),
            },
            Err(TrySendError::Closed(event)) => {
                debug!("no notification receiver; dropping {event:?}");
            }
        }
    }

    /// Convenience for `emit(ServerEvent::Warning { .. })`.
    pub fn warning(&self, text: impl Into<String>) {
        self.emit(ServerEvent::Warning { text: text.into() });
    }

    /// Convenience for `emit(ServerEvent::Error { .. })`.
    pub fn error(&self, text: impl Into<String>) {
        self.emit(ServerEvent::Error { text: text.into() });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
