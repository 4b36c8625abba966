//! Core types for the CAN signal encoder library
//!
//! This module defines the inputs the encoder consumes (update requests) and the
//! structs it hands to the transmission layer. The encoder is stateless: every
//! update produces a fresh frame and nothing is remembered between calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for encoder operations
pub type Result<T> = std::result::Result<T, EncoderError>;

/// Errors that can occur while loading signal tables or encoding frames
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Bit range error: {0}")]
    BitRangeError(String),

    #[error("Unknown byte order: {0:?} (expected \"intel\" or \"motorola\")")]
    UnknownByteOrder(String),

    #[error("Non-finite result: {0}")]
    NonFiniteResult(String),

    #[error("Failed to encode signal '{signal}' of message '{message}' (input {value}): {source}")]
    SignalEncoding {
        message: String,
        signal: String,
        value: f64,
        #[source]
        source: Box<EncoderError>,
    },

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Signal not found: {0}")]
    SignalNotFound(String),

    #[error("Failed to parse CSV file: {0}")]
    CsvParseError(String),

    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EncoderError {
    /// The innermost codec error, looking through `SignalEncoding` context
    pub fn root(&self) -> &EncoderError {
        match self {
            EncoderError::SignalEncoding { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Transmission hints passed through unmodified to the sink
///
/// The encoder never interprets these; cyclic resend and one-shot triggering
/// belong to the transmission layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitHints {
    /// Resend interval in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u32>,
    /// Whether the frame should be resent every `interval_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cyclic: Option<bool>,
    /// Whether the frame should be sent once right away
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate: Option<bool>,
}

impl TransmitHints {
    pub fn is_empty(&self) -> bool {
        self.interval_ms.is_none() && self.cyclic.is_none() && self.immediate.is_none()
    }
}

/// One update for a message: signal values in caller order plus hints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    /// `(signal name, physical value)` pairs, applied in this order
    pub values: Vec<(String, f64)>,
    /// Timing hints forwarded to the output
    pub hints: TransmitHints,
}

impl UpdateRequest {
    /// Create an empty update request
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: append a signal value
    pub fn with_value(mut self, signal: impl Into<String>, physical: f64) -> Self {
        self.values.push((signal.into(), physical));
        self
    }

    /// Builder method: set the cyclic resend interval
    pub fn with_interval_ms(mut self, interval_ms: u32) -> Self {
        self.hints.interval_ms = Some(interval_ms);
        self
    }

    /// Builder method: set the cyclic flag
    pub fn with_cyclic(mut self, cyclic: bool) -> Self {
        self.hints.cyclic = Some(cyclic);
        self
    }

    /// Builder method: set the immediate flag
    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.hints.immediate = Some(immediate);
        self
    }
}

/// Input addressed to a single signal
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalInput {
    /// Physical value, converted with factor/offset before packing
    pub value_phys: Option<f64>,
    /// Raw field value, packed as-is
    pub value_bits: Option<u64>,
    pub hints: TransmitHints,
}

/// A 64-bit frame accumulator for one message
///
/// The accumulator is sent big-endian: payload byte `k` lives in bits
/// `(7-k)*8..=(7-k)*8+7`. A message shorter than 8 bytes sends the top
/// `size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bits: u64,
    size: usize,
}

impl Frame {
    /// Create a zeroed frame carrying `size` payload bytes (1..=8)
    pub fn new(size: usize) -> Self {
        Self::from_bits(0, size)
    }

    /// Create a frame from an existing accumulator value
    pub fn from_bits(bits: u64, size: usize) -> Self {
        Self {
            bits,
            size: size.clamp(1, 8),
        }
    }

    /// Merge a packed field: `(frame & !mask) | (value_bits & mask)`
    pub fn apply(&mut self, field: &BitField) {
        self.bits = (self.bits & !field.mask) | (field.value_bits & field.mask);
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Payload bytes in transmission order
    pub fn payload(&self) -> Vec<u8> {
        self.bits.to_be_bytes()[..self.size].to_vec()
    }

    /// Fixed-width big-endian hex of the accumulator, `2 * size` digits
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.payload())
    }
}

/// A packed field: where it lives and what it holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitField {
    /// 1s exactly at the bits the field occupies
    pub mask: u64,
    /// The field value positioned inside `mask`
    pub value_bits: u64,
}

impl BitField {
    /// Whether two fields claim any common bit
    pub fn overlaps(&self, other: &BitField) -> bool {
        self.mask & other.mask != 0
    }
}

/// Composed frame handed to the transmission layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameUpdate {
    /// Message name from the signal table
    pub message: String,
    /// CAN arbitration ID
    pub can_id: u32,
    /// Payload as big-endian hex, `size` bytes, byte 0 first
    pub raw_frame: String,
    #[serde(flatten)]
    pub hints: TransmitHints,
    /// The accumulator the hex was rendered from
    #[serde(skip)]
    pub frame: Frame,
}

/// Layout and value of one signal, for writers that merge fields themselves
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalUpdate {
    pub message: String,
    pub signal: String,
    pub can_id: u32,
    pub mask_hex: String,
    pub value_bits_hex: String,
    pub unit: String,
    pub factor: f64,
    pub offset: f64,
    pub signed: bool,
    pub start_bit: u16,
    pub bit_length: u16,
    pub byte_order: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_phys: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_bits: Option<u64>,
    #[serde(flatten)]
    pub hints: TransmitHints,
}

impl fmt::Display for FrameUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:X}) [{}]", self.message, self.can_id, self.raw_frame)
    }
}
