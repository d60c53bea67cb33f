//! In-memory dispatcher that records every call.
//!
//! # Why a recording dispatcher?
//!
//! The native dispatcher moves the real pointer and presses real keys, which
//! a test can neither allow nor observe.  `RecordingDispatcher` keeps a
//! virtual pointer position and an ordered log of calls instead, so tests
//! can assert exactly what the server asked the OS to do.
//!
//! # `should_fail` flag
//!
//! Set it with [`RecordingDispatcher::fail_next_calls`] to make every call
//! return [`DispatchError::Platform`], which exercises the server's
//! dispatch-error path without a broken OS.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, PoisonError,
};

use pen_core::{KeySymbol, MouseButton};

use crate::application::dispatch::{DispatchError, InputDispatcher};

/// One recorded dispatcher call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchCall {
    Move { dx: f64, dy: f64 },
    Button { button: MouseButton, pressed: bool },
    Key { symbol: KeySymbol, pressed: bool },
}

/// Dispatcher that records calls and tracks a virtual pointer position.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    position: Mutex<(f64, f64)>,
    calls: Mutex<Vec<DispatchCall>>,
    should_fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual pointer position: the sum of every successful move.
    pub fn position(&self) -> (f64, f64) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every successful call, in order.
    pub fn calls(&self) -> Vec<DispatchCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fail_next_calls(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: DispatchCall) -> Result<(), DispatchError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Platform("recording dispatcher failure".into()));
        }
        if let DispatchCall::Move { dx, dy } = call {
            let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
            position.0 += dx;
            position.1 += dy;
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        Ok(())
    }
}

impl InputDispatcher for RecordingDispatcher {
    fn move_cursor_relative(&self, dx: f64, dy: f64) -> Result<(), DispatchError> {
        self.record(DispatchCall::Move { dx, dy })
    }

    fn set_button(&self, button: MouseButton, pressed: bool) -> Result<(), DispatchError> {
        self.record(DispatchCall::Button { button, pressed })
    }

    fn set_key(&self, symbol: KeySymbol, pressed: bool) -> Result<(), DispatchError> {
        self.record(DispatchCall::Key { symbol, pressed })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
