//! Input dispatch: the interface to the local input system and the single
//! worker that feeds it.
//!
//! The platform-specific implementations of [`InputDispatcher`] live in the
//! infrastructure layer.
//!
//! # Ordering
//!
//! Every session submits decoded events into one bounded FIFO queue and one
//! worker task drains it.  Within a session, events reach the dispatcher in
//! the order they arrived on the wire.  Across sessions, they reach it in the
//! order they entered the queue.  The dispatcher itself never sees two calls
//! at once.
//!
//! A dispatcher error or panic is logged and reported as a notification.  It
//! never reaches the session that produced the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use pen_core::{ConnectionId, InputEvent, KeySymbol, MouseButton};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::events::EventSink;

/// Default depth of the dispatch queue.
pub const DEFAULT_DISPATCH_QUEUE_DEPTH: usize = 256;

/// Error type for input dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("platform error: {0}")]
    Platform(String),
    #[error("dispatcher panicked: {0}")]
    Panicked(String),
}

/// Platform-agnostic input injection.
///
/// Calls are expected to return quickly; they run on the dispatch worker.
pub trait InputDispatcher: Send + Sync {
    /// Moves the pointer by a relative amount.
    fn move_cursor_relative(&self, dx: f64, dy: f64) -> Result<(), DispatchError>;

    /// Presses (`pressed == true`) or releases a mouse button.
    fn set_button(&self, button: MouseButton, pressed: bool) -> Result<(), DispatchError>;

    /// Presses or releases an allow-listed key.
    fn set_key(&self, symbol: KeySymbol, pressed: bool) -> Result<(), DispatchError>;
}

/// Routes one event to the matching dispatcher call.
pub fn apply_event(
    dispatcher: &dyn InputDispatcher,
    event: &InputEvent,
) -> Result<(), DispatchError> {
    match *event {
        InputEvent::MouseDelta { dx, dy } => dispatcher.move_cursor_relative(dx, dy),
        InputEvent::MouseButton { button, pressed } => dispatcher.set_button(button, pressed),
        InputEvent::Key { symbol, pressed } => dispatcher.set_key(symbol, pressed),
    }
}

/// One queued event and the connection it came from.
#[derive(Debug, Clone, Copy)]
struct Submission {
    connection: ConnectionId,
    event: InputEvent,
}

/// Producer side of the dispatch queue.  Cloned into every session.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Submission>,
}

impl DispatchHandle {
    /// Queues `event`, waiting if the queue is full.
    ///
    /// Returns `false` once the worker has shut down.
    pub async fn submit(&self, connection: ConnectionId, event: InputEvent) -> bool {
        self.tx.send(Submission { connection, event }).await.is_ok()
    }
}

/// Starts the dispatch worker.
///
/// The worker runs until every [`DispatchHandle`] has been dropped and the
/// queue is empty.
pub fn spawn_dispatch_worker(
    dispatcher: Arc<dyn InputDispatcher>,
    events: EventSink,
    queue_depth: usize,
) -> (DispatchHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    let task = tokio::spawn(dispatch_loop(dispatcher, events, rx));
    (DispatchHandle { tx }, task)
}

async fn dispatch_loop(
    dispatcher: Arc<dyn InputDispatcher>,
    events: EventSink,
    mut rx: mpsc::Receiver<Submission>,
) {
    debug!("dispatch worker started");
    let mut dispatched: u64 = 0;

    while let Some(Submission { connection, event }) = rx.recv().await {
        let outcome = catch_unwind(AssertUnwindSafe(|| apply_event(dispatcher.as_ref(), &event)))
            .unwrap_or_else(|payload| Err(DispatchError::Panicked(panic_message(&*payload))));

        match outcome {
            Ok(()) => dispatched += 1,
            Err(e) => {
                warn!("client {connection}: {} dispatch failed: {e}", event.kind());
                events.warning(format!("input dispatch failed: {e}"));
            }
        }
    }

    info!("dispatch worker stopped after {dispatched} event(s)");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pen_core::ServerEvent;
    use std::sync::Mutex;
    use uuid::Uuid;

    // ── Test dispatchers ──────────────────────────────────────────────────────

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
        should_fail: bool,
    }

    impl Recording {
        fn record(&self, call: String) -> Result<(), DispatchError> {
            if self.should_fail {
                return Err(DispatchError::Platform("injected failure".to_string()));
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl InputDispatcher for Recording {
        fn move_cursor_relative(&self, dx: f64, dy: f64) -> Result<(), DispatchError> {
            self.record(format!("move({dx},{dy})"))
        }

        fn set_button(&self, button: MouseButton, pressed: bool) -> Result<(), DispatchError> {
            self.record(format!("button({button:?},{pressed})"))
        }

        fn set_key(&self, symbol: KeySymbol, pressed: bool) -> Result<(), DispatchError> {
            self.record(format!("key({symbol},{pressed})"))
        }
    }

    struct Panicking;

    impl InputDispatcher for Panicking {
        fn move_cursor_relative(&self, _: f64, _: f64) -> Result<(), DispatchError> {
            panic!("cursor exploded")
        }

        fn set_button(&self, _: MouseButton, _: bool) -> Result<(), DispatchError> {
            Ok(())
        }

        fn set_key(&self, _: KeySymbol, _: bool) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    // ── apply_event ───────────────────────────────────────────────────────────

    #[test]
    fn test_apply_event_routes_each_kind() {
        // Arrange
        let rec = Recording::default();

        // Act
        apply_event(&rec, &InputEvent::MouseDelta { dx: 10.0, dy: -5.0 }).unwrap();
        apply_event(
            &rec,
            &InputEvent::MouseButton {
                button: MouseButton::Right,
                pressed: true,
            },
        )
        .unwrap();
        apply_event(
            &rec,
            &InputEvent::Key {
                symbol: KeySymbol::Q,
                pressed: false,
            },
        )
        .unwrap();

        // Assert
        assert_eq!(
            *rec.calls.lock().unwrap(),
            vec!["move(10,-5)", "button(Right,true)", "key(q,false)"]
        );
    }

    // ── Worker ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_worker_preserves_submission_order() {
        // Arrange
        let rec = Arc::new(Recording::default());
        let (events, _rx) = EventSink::new(8);
        let (handle, task) = spawn_dispatch_worker(rec.clone(), events, 2);
        let id = Uuid::new_v4();

        // Act
        for i in 0..5 {
            let event = InputEvent::MouseDelta {
                dx: f64::from(i),
                dy: 0.0,
            };
            assert!(handle.submit(id, event).await);
        }
        drop(handle);
        task.await.unwrap();

        // Assert
        assert_eq!(
            *rec.calls.lock().unwrap(),
            vec!["move(0,0)", "move(1,0)", "move(2,0)", "move(3,0)", "move(4,0)"]
        );
    }

    #[tokio::test]
    async fn test_worker_reports_dispatch_failure_and_keeps_running() {
        // Arrange
        let rec = Arc::new(Recording {
            should_fail: true,
            ..Recording::default()
        });
        let (events, mut rx) = EventSink::new(8);
        let (handle, task) = spawn_dispatch_worker(rec, events, 4);

        // Act
        let id = Uuid::new_v4();
        handle.submit(id, InputEvent::MouseDelta { dx: 1.0, dy: 1.0 }).await;
        handle.submit(id, InputEvent::MouseDelta { dx: 2.0, dy: 2.0 }).await;
        drop(handle);
        task.await.unwrap();

        // Assert
        for _ in 0..2 {
            match rx.try_recv().unwrap() {
                ServerEvent::Warning { text } => assert!(text.contains("injected failure")),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_worker_survives_dispatcher_panic() {
        // Arrange
        let (events, mut rx) = EventSink::new(8);
        let (handle, task) = spawn_dispatch_worker(Arc::new(Panicking), events, 4);
        let id = Uuid::new_v4();

        // Act
        handle.submit(id, InputEvent::MouseDelta { dx: 1.0, dy: 0.0 }).await;
        let still_running = handle
            .submit(
                id,
                InputEvent::Key {
                    symbol: KeySymbol::C,
                    pressed: true,
                },
            )
            .await;
        drop(handle);

        // Assert
        assert!(still_running);
        assert!(task.await.is_ok(), "worker must not die on a dispatcher panic");
        match rx.try_recv().unwrap() {
            ServerEvent::Warning { text } => assert!(text.contains("cursor exploded")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_panic_message_extracts_string_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_string()), "boom");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
