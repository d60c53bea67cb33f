//! Platform input dispatchers.
//!
//! - **`recording`** – records every call in memory.  Used by tests and by
//!   hosts that want to observe input without touching the desktop.
//! - **`logging`** – logs every call and injects nothing.  The fallback on
//!   platforms without a native dispatcher.
//! - **`windows`** – injects real pointer and key events with `SendInput`.

pub mod logging;
pub mod recording;
#[cfg(target_os = "windows")]
pub mod windows;

pub use logging::LoggingDispatcher;
pub use recording::{DispatchCall, RecordingDispatcher};
#[cfg(target_os = "windows")]
pub use windows::WindowsInputDispatcher;
