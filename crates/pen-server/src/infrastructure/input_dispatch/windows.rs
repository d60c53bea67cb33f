//! Windows input dispatch via `SetCursorPos` and `SendInput`.
//!
//! Relative moves read the current pointer position and set the new one
//! directly, which bypasses pointer acceleration.  The target is truncated
//! to whole pixels.  Buttons and keys are injected with `SendInput`.

#![cfg(target_os = "windows")]

use pen_core::{KeySymbol, MouseButton};
use windows::Win32::Foundation::POINT;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEINPUT, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetCursorPos, SetCursorPos};

use crate::application::dispatch::{DispatchError, InputDispatcher};

/// Native dispatcher for the interactive Windows desktop.
#[derive(Debug, Default)]
pub struct WindowsInputDispatcher;

impl WindowsInputDispatcher {
    pub fn new() -> Self {
        Self
    }
}

impl InputDispatcher for WindowsInputDispatcher {
    fn move_cursor_relative(&self, dx: f64, dy: f64) -> Result<(), DispatchError> {
        let mut current = POINT::default();
        // SAFETY: `current` is a valid, writable POINT on the stack.
        unsafe { GetCursorPos(&mut current) }
            .map_err(|e| DispatchError::Platform(format!("GetCursorPos: {e}")))?;
        let (x, y) = relative_target(current.x, current.y, dx, dy);
        // SAFETY: SetCursorPos takes plain integers.
        unsafe { SetCursorPos(x, y) }
            .map_err(|e| DispatchError::Platform(format!("SetCursorPos: {e}")))
    }

    fn set_button(&self, button: MouseButton, pressed: bool) -> Result<(), DispatchError> {
        let flags = match (button, pressed) {
            (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
            (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
            (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
            (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
        };
        send(INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: 0,
                    dy: 0,
                    mouseData: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        })
    }

    fn set_key(&self, symbol: KeySymbol, pressed: bool) -> Result<(), DispatchError> {
        let flags = if pressed {
            KEYBD_EVENT_FLAGS::default()
        } else {
            KEYEVENTF_KEYUP
        };
        send(INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(virtual_key(symbol)),
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn send(input: INPUT) -> Result<(), DispatchError> {
    // SAFETY: `input` is a fully initialised INPUT and the size matches.
    let injected = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if injected == 1 {
        Ok(())
    } else {
        Err(DispatchError::Platform(
            "SendInput was blocked (UIPI or secure desktop?)".to_string(),
        ))
    }
}

/// Virtual-key code for an allow-listed symbol.  Letter keys use their
/// uppercase ASCII code.
fn virtual_key(symbol: KeySymbol) -> u16 {
    match symbol {
        KeySymbol::C => 0x43,
        KeySymbol::Z => 0x5A,
        KeySymbol::E => 0x45,
        KeySymbol::Q => 0x51,
    }
}

/// Each delta is truncated toward zero on its own, so `+d` then `-d` always
/// lands back on the starting pixel.
fn relative_target(x: i32, y: i32, dx: f64, dy: f64) -> (i32, i32) {
    (x.saturating_add(dx as i32), y.saturating_add(dy as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_keys_are_uppercase_ascii() {
        for symbol in KeySymbol::ALL {
            let expected = symbol.as_char().to_ascii_uppercase() as u16;
            assert_eq!(virtual_key(symbol), expected);
        }
    }

    #[test]
    fn test_relative_target_truncates_each_delta_toward_zero() {
        assert_eq!(relative_target(100, 100, 2.7, -2.7), (102, 98));
    }

    #[test]
    fn test_relative_target_half_pixel_deltas_return_to_origin() {
        // Arrange
        let start = (100, 100);

        // Act
        let there = relative_target(start.0, start.1, 0.5, -0.5);
        let back = relative_target(there.0, there.1, -0.5, 0.5);

        // Assert
        assert_eq!(there, start);
        assert_eq!(back, start);
    }

    #[test]
    fn test_relative_target_saturates_at_screen_extremes() {
        assert_eq!(relative_target(i32::MAX, i32::MIN, 10.0, -10.0), (i32::MAX, i32::MIN));
    }
}
