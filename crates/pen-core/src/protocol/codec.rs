//! Decoder from one wire line to one [`InputEvent`].
//!
//! Decoding rules:
//!
//! | `type`       | fields              | event                                    |
//! |--------------|---------------------|------------------------------------------|
//! | `mousedelta` | `deltaX`, `deltaY`  | `MouseDelta { dx, dy }` (finite floats)  |
//! | `mousedown`  | `button`            | `MouseButton { button, pressed: true }`  |
//! | `mouseup`    | `button`            | `MouseButton { button, pressed: false }` |
//! | `keydown`    | `key`               | `Key { symbol, pressed: true }`          |
//! | `keyup`      | `key`               | `Key { symbol, pressed: false }`         |
//!
//! `button` is an integer; `0` is the left button and any other integer is
//! the right button.  `key` must be exactly one character from the
//! allow-list `{c, z, e, q}`, matched without regard to case.
//!
//! Every failure is a [`ProtocolError`].  Callers drop the offending line and
//! carry on; a decode error never ends a session.

use thiserror::Error;

use crate::domain::input::{InputEvent, KeySymbol, MouseButton};
use crate::protocol::wire::{ScalarText, WireMessage};

/// Errors produced while decoding a single line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line is not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// The line is not valid JSON.
    #[error("malformed JSON: {0}")]
    Json(String),

    /// The JSON value is not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The object has no `type` field.
    #[error("message has no \"type\" field")]
    MissingType,

    /// The `type` field names a message kind this server does not handle.
    #[error("unrecognised message type {0:?}")]
    UnknownType(String),

    /// A payload field is missing or is not a scalar value.
    #[error("invalid message fields: {0}")]
    InvalidFields(String),

    /// A numeric field does not hold a finite number.
    #[error("field {field:?} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// The `key` field is not exactly one character.
    #[error("key must be a single character, got {0:?}")]
    InvalidKey(String),

    /// The key is outside the allow-list.
    #[error("key {0:?} is not permitted")]
    KeyNotAllowed(char),

    /// The line was longer than the framer allows and was discarded.
    #[error("line exceeded {limit} bytes and was discarded")]
    LineTooLong { limit: usize },
}

/// Decodes one line of wire text (terminator already stripped).
///
/// # Errors
///
/// Returns [`ProtocolError`] for anything that does not map to an event.
///
/// # Examples
///
/// ```rust
/// use pen_core::{decode_line, InputEvent};
///
/// let event = decode_line(r#"{"type":"mousedelta","deltaX":"10","deltaY":"-5"}"#).unwrap();
/// assert_eq!(event, InputEvent::MouseDelta { dx: 10.0, dy: -5.0 });
/// ```
pub fn decode_line(line: &str) -> Result<InputEvent, ProtocolError> {
    match WireMessage::parse(line)? {
        WireMessage::MouseDelta { delta_x, delta_y } => Ok(InputEvent::MouseDelta {
            dx: parse_float("deltaX", &delta_x)?,
            dy: parse_float("deltaY", &delta_y)?,
        }),
        WireMessage::MouseDown { button } => Ok(InputEvent::MouseButton {
            button: parse_button(&button)?,
            pressed: true,
        }),
        WireMessage::MouseUp { button } => Ok(InputEvent::MouseButton {
            button: parse_button(&button)?,
            pressed: false,
        }),
        WireMessage::KeyDown { key } => Ok(InputEvent::Key {
            symbol: parse_key(&key)?,
            pressed: true,
        }),
        WireMessage::KeyUp { key } => Ok(InputEvent::Key {
            symbol: parse_key(&key)?,
            pressed: false,
        }),
    }
}

/// Decodes one framed line given as raw bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidUtf8`] if the bytes are not UTF-8, and
/// otherwise whatever [`decode_line`] returns.
pub fn decode_frame(frame: &[u8]) -> Result<InputEvent, ProtocolError> {
    let line = std::str::from_utf8(frame).map_err(|_| ProtocolError::InvalidUtf8)?;
    decode_line(line)
}

fn parse_float(field: &'static str, text: &ScalarText) -> Result<f64, ProtocolError> {
    let invalid = || ProtocolError::InvalidNumber {
        field,
        value: text.as_str().to_owned(),
    };
    let value: f64 = text.as_str().trim().parse().map_err(|_| invalid())?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid())
    }
}

fn parse_button(text: &ScalarText) -> Result<MouseButton, ProtocolError> {
    let code: i64 = text
        .as_str()
        .trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber {
            field: "button",
            value: text.as_str().to_owned(),
        })?;
    Ok(MouseButton::from_code(code))
}

fn parse_key(text: &ScalarText) -> Result<KeySymbol, ProtocolError> {
    let mut chars = text.as_str().chars();
    let c = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => return Err(ProtocolError::InvalidKey(text.as_str().to_owned())),
    };
    KeySymbol::from_char(c).ok_or(ProtocolError::KeyNotAllowed(c))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
