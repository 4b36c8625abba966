//! Update message value extraction
//!
//! Update messages arrive in several shapes: a bare number payload, a payload
//! object with `value` or `value_phys`, or fields on the message itself. Each
//! lookup is an ordered list of [`ValueSource`]s; the first one present wins.

use crate::types::{SignalInput, TransmitHints, UpdateRequest};
use serde_json::Value;

/// Where to look for a value in an update message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// A named field of the `payload` object
    PayloadField(&'static str),
    /// The `payload` itself, when it is a number
    PayloadNumber,
    /// A named field of the message
    MessageField(&'static str),
}

impl ValueSource {
    /// Look this source up in a message
    pub fn lookup<'a>(&self, msg: &'a Value) -> Option<&'a Value> {
        let found = match self {
            ValueSource::PayloadField(key) => payload_object(msg).and_then(|p| p.get(*key)),
            ValueSource::PayloadNumber => msg.get("payload").filter(|p| p.is_number()),
            ValueSource::MessageField(key) => msg.get(*key),
        };
        found.filter(|v| !v.is_null())
    }
}

/// Physical value of a single-signal update, in priority order
pub const PHYSICAL_VALUE_SOURCES: &[ValueSource] = &[
    ValueSource::PayloadField("value_phys"),
    ValueSource::PayloadField("value"),
    ValueSource::PayloadNumber,
    ValueSource::MessageField("signal_value"),
    ValueSource::MessageField("value"),
];

/// Raw field value of a single-signal update, in priority order
pub const RAW_BITS_SOURCES: &[ValueSource] = &[
    ValueSource::PayloadField("value_bits"),
    ValueSource::MessageField("value_bits"),
];

/// Target message name, in priority order
pub const MESSAGE_NAME_SOURCES: &[ValueSource] = &[
    ValueSource::MessageField("message"),
    ValueSource::MessageField("topic"),
];

/// Payload keys that carry transmission hints rather than signal values
pub const HINT_KEYS: &[&str] = &["interval_ms", "cyclic", "immediate"];

/// Return the first value found, trying sources in order
pub fn first_present<'a>(msg: &'a Value, sources: &[ValueSource]) -> Option<&'a Value> {
    sources.iter().find_map(|source| source.lookup(msg))
}

/// Coerce a JSON value to a number
///
/// Numbers pass through, booleans become 1/0 and numeric strings are parsed.
/// `null` and the empty string are 0. Anything else is NaN, which the scalar
/// codec rejects as non-finite.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Null => 0.0,
        _ => f64::NAN,
    }
}

/// Coerce a JSON value to a boolean
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        _ => true,
    }
}

/// Read the transmission hints; payload fields override message fields
pub fn extract_hints(msg: &Value) -> TransmitHints {
    let hint = |key: &'static str| {
        first_present(msg, &[ValueSource::PayloadField(key), ValueSource::MessageField(key)])
    };

    TransmitHints {
        interval_ms: hint("interval_ms").and_then(to_interval),
        cyclic: hint("cyclic").map(to_bool),
        immediate: hint("immediate").map(to_bool),
    }
}

/// Name of the message an update targets, if it carries one
pub fn message_name(msg: &Value) -> Option<&str> {
    first_present(msg, MESSAGE_NAME_SOURCES).and_then(Value::as_str)
}

fn to_interval(value: &Value) -> Option<u32> {
    let interval = to_number(value);
    if interval.is_finite() && interval >= 0.0 {
        Some(interval.min(f64::from(u32::MAX)) as u32)
    } else {
        None
    }
}

fn payload_object(msg: &Value) -> Option<&serde_json::Map<String, Value>> {
    msg.get("payload").and_then(Value::as_object)
}

impl UpdateRequest {
    /// Build an update from a message whose payload maps signal names to values
    ///
    /// Payload order is preserved. Hint keys are not treated as signals.
    /// A payload that is not an object yields an update with no values.
    pub fn from_json(msg: &Value) -> Self {
        let values = payload_object(msg)
            .map(|payload| {
                payload
                    .iter()
                    .filter(|(key, _)| !HINT_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), to_number(value)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            values,
            hints: extract_hints(msg),
        }
    }
}

impl SignalInput {
    /// Build a single-signal input from an update message
    pub fn from_json(msg: &Value) -> Self {
        let value_phys = first_present(msg, PHYSICAL_VALUE_SOURCES).map(to_number);
        let value_bits = first_present(msg, RAW_BITS_SOURCES)
            .map(to_number)
            .filter(|v| v.is_finite())
            .map(|v| v.max(0.0) as u64);

        Self {
            value_phys,
            value_bits,
            hints: extract_hints(msg),
        }
    }
}
