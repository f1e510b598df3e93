//! Attribute codec
//!
//! Converts between attribute strings and property values. The JSON kind
//! of a property's declared default picks the conversion; decoding never
//! fails, it falls back to the raw string.

use serde_json::Value;

/// Conversion used for a property, taken from its default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Boolean,
    Json,
}

impl ValueKind {
    pub fn of(default: &Value) -> Self {
        match default {
            Value::String(_) => Self::String,
            Value::Bool(_) => Self::Boolean,
            _ => Self::Json,
        }
    }
}

/// Encode `value` for an attribute whose property defaults to `default`
pub fn encode(default: &Value, value: &Value) -> String {
    match (ValueKind::of(default), value) {
        (ValueKind::String, Value::String(s)) => s.clone(),
        (ValueKind::Boolean, Value::Bool(true)) => String::new(),
        (ValueKind::Boolean, Value::Bool(false)) => "false".to_string(),
        // A string that is not itself JSON is written raw so it reads back unchanged
        (ValueKind::Json, Value::String(s)) if serde_json::from_str::<Value>(s).is_err() => s.clone(),
        (_, other) => other.to_string(),
    }
}

/// Decode an attribute value for a property that defaults to `default`
pub fn decode(default: &Value, raw: &str) -> Value {
    match ValueKind::of(default) {
        ValueKind::String => Value::String(raw.to_string()),
        ValueKind::Boolean => Value::Bool(!matches!(raw, "0" | "false")),
        ValueKind::Json => decode_untyped(raw),
    }
}

/// JSON when `raw` parses, the raw string otherwise
pub fn decode_untyped(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Whether `value` counts as the default (objects and arrays compare by encoded form)
pub fn is_default(default: &Value, value: &Value) -> bool {
    if value == default {
        return true;
    }
    matches!(default, Value::Array(_) | Value::Object(_)) && encode(default, value) == encode(default, default)
}
