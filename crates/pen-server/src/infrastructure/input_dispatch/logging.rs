//! Dispatcher that only logs.

use pen_core::{KeySymbol, MouseButton};
use tracing::info;

use crate::application::dispatch::{DispatchError, InputDispatcher};

/// Logs each input call at `info` level and injects nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

impl InputDispatcher for LoggingDispatcher {
    fn move_cursor_relative(&self, dx: f64, dy: f64) -> Result<(), DispatchError> {
        info!(dx, dy, "move cursor");
        Ok(())
    }

    fn set_button(&self, button: MouseButton, pressed: bool) -> Result<(), DispatchError> {
        info!(?button, pressed, "mouse button");
        Ok(())
    }

    fn set_key(&self, symbol: KeySymbol, pressed: bool) -> Result<(), DispatchError> {
        info!(key = %symbol, pressed, "key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_dispatcher_never_fails() {
        let d = LoggingDispatcher;
        assert!(d.move_cursor_relative(1.0, -1.0).is_ok());
        assert!(d.set_button(MouseButton::Left, true).is_ok());
        assert!(d.set_key(KeySymbol::Q, false).is_ok());
    }
}
