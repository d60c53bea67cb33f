//! Typed input events decoded from the wire protocol.
//!
//! An [`InputEvent`] is what the remote control *means*: move the pointer by a
//! relative amount, press or release a mouse button, or press or release one
//! of the permitted keys.  How the event is applied to the local machine is
//! the business of the input dispatcher in `pen-server`.
//!
//! # The key allow-list
//!
//! Only four symbols are actionable: `c`, `z`, `e`, and `q`.  The set is kept
//! deliberately small so a remote client can never type arbitrary text on
//! the host.  [`KeySymbol`] is the closed enum of those symbols; a character
//! outside the set simply has no `KeySymbol`.

/// A mouse button the remote control can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
}

impl MouseButton {
    /// Maps the wire button code to a button.
    ///
    /// `0` is the primary (left) button; every other code is treated as the
    /// secondary (right) button.
    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            MouseButton::Left
        } else {
            MouseButton::Right
        }
    }
}

/// A key the remote control is allowed to press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySymbol {
    C,
    Z,
    E,
    Q,
}

impl KeySymbol {
    /// Every symbol in the allow-list.
    pub const ALL: [KeySymbol; 4] = [KeySymbol::C, KeySymbol::Z, KeySymbol::E, KeySymbol::Q];

    /// Looks up a character in the allow-list, ignoring ASCII case.
    ///
    /// Returns `None` for every character outside `{c, z, e, q}`.
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'c' => Some(KeySymbol::C),
            'z' => Some(KeySymbol::Z),
            'e' => Some(KeySymbol::E),
            'q' => Some(KeySymbol::Q),
            _ => None,
        }
    }

    /// The lowercase character for this symbol.
    pub fn as_char(self) -> char {
        match self {
            KeySymbol::C => 'c',
            KeySymbol::Z => 'z',
            KeySymbol::E => 'e',
            KeySymbol::Q => 'q',
        }
    }
}

impl std::fmt::Display for KeySymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One decoded input action from the remote control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Relative pointer movement in device pixels.
    MouseDelta { dx: f64, dy: f64 },
    /// Mouse button press (`pressed == true`) or release.
    MouseButton { button: MouseButton, pressed: bool },
    /// Key press (`pressed == true`) or release for an allow-listed symbol.
    Key { symbol: KeySymbol, pressed: bool },
}

impl InputEvent {
    /// Short, stable name of the event kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            InputEvent::MouseDelta { .. } => "mousedelta",
            InputEvent::MouseButton { pressed: true, .. } => "mousedown",
            InputEvent::MouseButton { pressed: false, .. } => "mouseup",
            InputEvent::Key { pressed: true, .. } => "keydown",
            InputEvent::Key { pressed: false, .. } => "keyup",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_zero_is_left() {
        assert_eq!(MouseButton::from_code(0), MouseButton::Left);
    }

    #[test]
    fn test_from_code_non_zero_is_right() {
        assert_eq!(MouseButton::from_code(1), MouseButton::Right);
        assert_eq!(MouseButton::from_code(2), MouseButton::Right);
        assert_eq!(MouseButton::from_code(-1), MouseButton::Right);
    }

    #[test]
    fn test_key_symbol_from_char_is_case_insensitive() {
        for symbol in KeySymbol::ALL {
            let lower = symbol.as_char();
            let upper = lower.to_ascii_uppercase();
            assert_eq!(KeySymbol::from_char(lower), Some(symbol));
            assert_eq!(KeySymbol::from_char(upper), Some(symbol));
        }
    }

    #[test]
    fn test_key_symbol_from_char_rejects_characters_outside_allow_list() {
        for c in ['a', 'x', 'Y', '1', ' ', 'é'] {
            assert_eq!(KeySymbol::from_char(c), None, "{c:?} must not be allowed");
        }
    }

    #[test]
    fn test_input_event_kind_names_match_wire_types() {
        let down = InputEvent::MouseButton {
            button: MouseButton::Left,
            pressed: true,
        };
        let up = InputEvent::Key {
            symbol: KeySymbol::Q,
            pressed: false,
        };
        assert_eq!(down.kind(), "mousedown");
        assert_eq!(up.kind(), "keyup");
        assert_eq!(InputEvent::MouseDelta { dx: 1.0, dy: 2.0 }.kind(), "mousedelta");
    }
}
