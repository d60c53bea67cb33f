//! Schema for one wire message.
//!
//! Every line the remote sends is a flat JSON object whose `"type"` field
//! selects the message kind:
//!
//! ```json
//! {"type":"mousedelta","deltaX":"10","deltaY":"-5"}
//! {"type":"mousedown","button":"0"}
//! {"type":"keyup","key":"q"}
//! ```
//!
//! The remote carries numbers and keys as *text*, so each payload field is a
//! [`ScalarText`]: any JSON string, number, or boolean, kept as its textual
//! form for the codec to interpret.  The message must be flat: an object or
//! array in any field, named by the schema or not, rejects the line.  Scalar
//! fields the schema does not name are ignored.
//!
//! Parsing goes through [`serde_json::Value`] first so a bad line produces a
//! precise [`ProtocolError`] (not an object, missing `type`, unknown `type`)
//! instead of serde's generic "unknown variant" text.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use serde_json::Value;

use crate::protocol::codec::ProtocolError;

/// Discriminator values the protocol recognises.
pub const KNOWN_TYPES: [&str; 5] = ["mousedelta", "mousedown", "mouseup", "keydown", "keyup"];

/// The textual form of a scalar JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarText(pub String);

impl ScalarText {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ScalarText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = ScalarText;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number, or boolean")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<ScalarText, E> {
                Ok(ScalarText(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// One message as it appears on the wire, before field interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    MouseDelta {
        #[serde(rename = "deltaX")]
        delta_x: ScalarText,
        #[serde(rename = "deltaY")]
        delta_y: ScalarText,
    },
    MouseDown {
        button: ScalarText,
    },
    MouseUp {
        button: ScalarText,
    },
    KeyDown {
        key: ScalarText,
    },
    KeyUp {
        key: ScalarText,
    },
}

impl WireMessage {
    /// Parses one line of text into a wire message.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Json`] if the text is not JSON at all.
    /// - [`ProtocolError::NotAnObject`] if the JSON is not an object.
    /// - [`ProtocolError::MissingType`] / [`ProtocolError::UnknownType`] for a
    ///   missing or unrecognised discriminator.
    /// - [`ProtocolError::InvalidFields`] if a required field is missing or
    ///   any field holds an object or array.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ProtocolError::Json(e.to_string()))?;

        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        match object.get("type") {
            None => return Err(ProtocolError::MissingType),
            Some(Value::String(t)) if KNOWN_TYPES.contains(&t.as_str()) => {}
            Some(Value::String(t)) => return Err(ProtocolError::UnknownType(t.clone())),
            Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
        }
        if let Some((name, _)) = object
            .iter()
            .find(|(_, v)| matches!(v, Value::Object(_) | Value::Array(_)))
        {
            return Err(ProtocolError::InvalidFields(format!(
                "field `{name}` holds a nested value"
            )));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidFields(e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mousedelta_with_string_fields() {
        // Arrange
        let line = r#"{"type":"mousedelta","deltaX":"10","deltaY":"-5"}"#;

        // Act
        let msg = WireMessage::parse(line).unwrap();

        // Assert
        assert_eq!(
            msg,
            WireMessage::MouseDelta {
                delta_x: ScalarText("10".into()),
                delta_y: ScalarText("-5".into()),
            }
        );
    }

    #[test]
    fn test_parse_accepts_native_numbers_as_scalar_text() {
        let msg = WireMessage::parse(r#"{"type":"mousedown","button":1}"#).unwrap();
        assert_eq!(
            msg,
            WireMessage::MouseDown {
                button: ScalarText("1".into())
            }
        );
    }

    #[test]
    fn test_parse_ignores_unknown_scalar_fields() {
        let msg = WireMessage::parse(r#"{"type":"keyup","key":"q","ts":"123","seq":7}"#).unwrap();
        assert_eq!(
            msg,
            WireMessage::KeyUp {
                key: ScalarText("q".into())
            }
        );
    }

    #[test]
    fn test_parse_rejects_nested_unknown_field() {
        // Arrange
        let line = r#"{"type":"keyup","key":"q","ts":"123","extra":{"a":1}}"#;

        // Act
        let err = WireMessage::parse(line).unwrap_err();

        // Assert
        assert_eq!(
            err,
            ProtocolError::InvalidFields("field `extra` holds a nested value".into())
        );
    }

    #[test]
    fn test_parse_rejects_array_in_unknown_field() {
        let err = WireMessage::parse(r#"{"type":"mousedown","button":"0","tags":[1]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFields(_)));
    }

    #[test]
    fn test_parse_rejects_missing_type() {
        let err = WireMessage::parse(r#"{"key":"x"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingType);
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let err = WireMessage::parse(r#"{"type":"scroll","dy":"3"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("scroll".into()));
    }

    #[test]
    fn test_parse_rejects_non_string_type() {
        let err = WireMessage::parse(r#"{"type":5}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(_)));
    }

    #[test]
    fn test_parse_rejects_non_object_json() {
        assert_eq!(
            WireMessage::parse(r#"["mousedown"]"#).unwrap_err(),
            ProtocolError::NotAnObject
        );
    }

    #[test]
    fn test_parse_rejects_nested_payload_field() {
        let err = WireMessage::parse(r#"{"type":"keydown","key":{"c":true}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFields(_)));
    }

    #[test]
    fn test_parse_rejects_missing_payload_field() {
        let err = WireMessage::parse(r#"{"type":"mousedelta","deltaX":"1"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFields(_)));
    }

    #[test]
    fn test_parse_rejects_text_that_is_not_json() {
        let err = WireMessage::parse("type=mousedown").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }
}
