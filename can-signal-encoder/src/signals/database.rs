//! Unified signal table
//!
//! Combines message definitions from CSV and DBC files into a single registry
//! keyed by message name. Every definition is validated on insertion so the
//! composer never sees a zero factor or a field that leaves the frame.

use crate::bits;
use crate::scalar;
use crate::types::{BitField, EncoderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    /// CAN message ID
    pub id: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message, in table order
    pub signals: Vec<SignalSpec>,
    /// Source file (CSV/DBC filename)
    pub source: String,
}

impl MessageDefinition {
    /// Create an empty 8-byte message
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            size: 8,
            sender: None,
            signals: Vec::new(),
            source: String::new(),
        }
    }

    /// Builder method: set the payload size in bytes
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Builder method: append a signal
    pub fn with_signal(mut self, signal: SignalSpec) -> Self {
        self.signals.push(signal);
        self
    }

    /// Look up a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalSpec> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Check the message size and every signal against it
    ///
    /// Overlapping signals are allowed; the composer resolves them by
    /// iteration order.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 || self.size > 8 {
            return Err(EncoderError::InvalidConfig(format!(
                "message '{}' has size {} bytes, expected 1..=8",
                self.name, self.size
            )));
        }

        for signal in &self.signals {
            let bytes = signal.validate().map_err(|e| {
                EncoderError::InvalidConfig(format!(
                    "message '{}' signal '{}': {}",
                    self.name, signal.name, e
                ))
            })?;
            if bytes > self.size {
                return Err(EncoderError::InvalidConfig(format!(
                    "message '{}' signal '{}' reaches byte {} but the message has {} bytes",
                    self.name,
                    signal.name,
                    bytes - 1,
                    self.size
                )));
            }
        }

        Ok(())
    }
}

/// A CAN signal specification
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame (LSB for intel, MSB for motorola)
    ///
    /// See [`crate::bits`] for how each byte order numbers bits.
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value (None = unbounded)
    pub min: Option<f64>,
    /// Maximum physical value (None = unbounded)
    pub max: Option<f64>,
    /// Engineering unit (e.g., "V", "A", "Hz")
    pub unit: Option<String>,
    pub comment: Option<String>,
}

impl SignalSpec {
    /// Create an unsigned intel signal with identity scaling and no bounds
    pub fn new(name: impl Into<String>, start_bit: u16, length: u16) -> Self {
        Self {
            name: name.into(),
            start_bit,
            length,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            min: None,
            max: None,
            unit: None,
            comment: None,
        }
    }

    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Validate the definition, returning how many payload bytes it reaches
    pub fn validate(&self) -> Result<usize> {
        if !self.factor.is_finite() || self.factor == 0.0 {
            return Err(EncoderError::InvalidConfig(format!(
                "factor must be finite and non-zero, got {}",
                self.factor
            )));
        }
        if !self.offset.is_finite() {
            return Err(EncoderError::InvalidConfig(format!(
                "offset must be finite, got {}",
                self.offset
            )));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(EncoderError::InvalidConfig(format!(
                    "min {} is greater than max {}",
                    min, max
                )));
            }
        }

        bits::field_extent(self.start_bit, self.length, self.byte_order)
    }

    /// Convert a physical value to this signal's raw integer
    pub fn physical_to_raw(&self, physical: f64) -> Result<i128> {
        scalar::physical_to_raw(physical, self.factor, self.offset, self.min, self.max)
    }

    /// Pack a raw value into this signal's field
    pub fn pack_raw(&self, raw: i128) -> Result<BitField> {
        bits::pack_bits(raw, self.start_bit, self.length, self.byte_order, self.value_type)
    }

    /// Convert and pack a physical value
    pub fn encode(&self, physical: f64) -> Result<BitField> {
        let raw = self.physical_to_raw(physical)?;
        self.pack_raw(raw)
    }

    pub fn is_signed(&self) -> bool {
        self.value_type == ValueType::Signed
    }
}

/// Byte order for signal placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian (Intel format), start bit counted from the frame value's LSB
    #[serde(rename = "intel")]
    LittleEndian,
    /// Little-endian in DBC `@1` numbering, start bit counted from payload byte 0
    #[serde(rename = "intel_payload")]
    LittleEndianPayload,
    /// Big-endian (Motorola format)
    #[serde(rename = "motorola")]
    BigEndian,
}

impl ByteOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "intel",
            ByteOrder::LittleEndianPayload => "intel_payload",
            ByteOrder::BigEndian => "motorola",
        }
    }
}

impl FromStr for ByteOrder {
    type Err = EncoderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intel" => Ok(ByteOrder::LittleEndian),
            "intel_payload" => Ok(ByteOrder::LittleEndianPayload),
            "motorola" => Ok(ByteOrder::BigEndian),
            _ => Err(EncoderError::UnknownByteOrder(s.to_string())),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Signed integer (two's complement)
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// The unified signal table
pub struct SignalDatabase {
    /// All message definitions by name
    messages: HashMap<String, MessageDefinition>,

    /// Message name lookup by CAN ID
    id_lookup: HashMap<u32, String>,
}

impl SignalDatabase {
    /// Create a new empty signal table
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
            id_lookup: HashMap::new(),
        }
    }

    /// Validate and add a message definition
    ///
    /// A message with the same name replaces the earlier definition.
    pub fn add_message(&mut self, message: MessageDefinition) -> Result<()> {
        message.validate()?;

        if let Some(previous) = self.messages.get(&message.name) {
            log::warn!(
                "Message '{}' from {} replaces the definition from {}",
                message.name,
                message.source,
                previous.source
            );
            let previous_id = previous.id;
            self.id_lookup.remove(&previous_id);
        }

        self.id_lookup.insert(message.id, message.name.clone());
        self.messages.insert(message.name.clone(), message);
        Ok(())
    }

    /// Get a message definition by name
    pub fn get_message(&self, name: &str) -> Option<&MessageDefinition> {
        self.messages.get(name)
    }

    /// Get a message definition by CAN ID
    pub fn get_message_by_id(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.id_lookup
            .get(&can_id)
            .and_then(|name| self.messages.get(name))
    }

    /// Get table statistics
    pub fn stats(&self) -> DatabaseStats {
        let num_messages = self.messages.len();
        let num_signals = self.messages.values().map(|msg| msg.signals.len()).sum();

        DatabaseStats {
            num_messages,
            num_signals,
        }
    }

    /// Get all message names, sorted
    pub fn message_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.messages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Table statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}

impl Default for SignalDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits_message() -> MessageDefinition {
        MessageDefinition::new(0x338, "HS_Value_Limits")
            .with_signal(
                SignalSpec::new("IHS_Maximum", 0, 16)
                    .with_scaling(0.03125, -1024.0)
                    .with_range(Some(-1024.0), Some(1023.96875))
                    .with_unit("A"),
            )
            .with_signal(
                SignalSpec::new("UHS_Maximum", 32, 16)
                    .with_scaling(0.03125, 0.0)
                    .with_range(Some(0.0), Some(2047.96875))
                    .with_unit("V"),
            )
    }

    #[test]
    fn test_empty_database() {
        let db = SignalDatabase::new();
        let stats = db.stats();
        assert_eq!(stats.num_messages, 0);
        assert_eq!(stats.num_signals, 0);
    }

    #[test]
    fn test_add_message() {
        let mut db = SignalDatabase::new();
        db.add_message(limits_message()).unwrap();

        let stats = db.stats();
        assert_eq!(stats.num_messages, 1);
        assert_eq!(stats.num_signals, 2);

        let msg = db.get_message("HS_Value_Limits").unwrap();
        assert_eq!(msg.id, 0x338);
        assert_eq!(msg.signal("UHS_Maximum").unwrap().start_bit, 32);
        assert!(msg.signal("Missing").is_none());

        assert_eq!(db.get_message_by_id(0x338).unwrap().name, "HS_Value_Limits");
        assert!(db.get_message_by_id(0x339).is_none());
    }

    #[test]
    fn test_replacing_message_updates_id_lookup() {
        let mut db = SignalDatabase::new();
        db.add_message(limits_message()).unwrap();

        let mut moved = limits_message();
        moved.id = 0x339;
        db.add_message(moved).unwrap();

        assert_eq!(db.stats().num_messages, 1);
        assert!(db.get_message_by_id(0x338).is_none());
        assert_eq!(db.get_message_by_id(0x339).unwrap().name, "HS_Value_Limits");
    }

    #[test]
    fn test_zero_factor_rejected_at_load() {
        let mut db = SignalDatabase::new();
        let message = MessageDefinition::new(0x100, "Bad")
            .with_signal(SignalSpec::new("Broken", 0, 8).with_scaling(0.0, 0.0));

        let err = db.add_message(message).unwrap_err();
        assert!(matches!(err, EncoderError::InvalidConfig(_)));
        assert_eq!(db.stats().num_messages, 0);
    }

    #[test]
    fn test_signal_beyond_message_size_rejected() {
        let message = MessageDefinition::new(0x100, "Short")
            .with_size(2)
            .with_signal(SignalSpec::new("TooFar", 16, 8));
        assert!(matches!(
            message.validate(),
            Err(EncoderError::InvalidConfig(_))
        ));

        // Two bytes send the top of the frame value: bits 48..=63
        let fits = MessageDefinition::new(0x100, "Short")
            .with_size(2)
            .with_signal(SignalSpec::new("Top", 48, 16));
        fits.validate().unwrap();
    }

    #[test]
    fn test_inverted_range_rejected() {
        let spec = SignalSpec::new("Inverted", 0, 8).with_range(Some(10.0), Some(5.0));
        assert!(matches!(spec.validate(), Err(EncoderError::InvalidConfig(_))));
    }

    #[test]
    fn test_byte_order_parsing() {
        assert_eq!("intel".parse::<ByteOrder>().unwrap(), ByteOrder::LittleEndian);
        assert_eq!(" Motorola ".parse::<ByteOrder>().unwrap(), ByteOrder::BigEndian);
        assert!(matches!(
            "foo".parse::<ByteOrder>(),
            Err(EncoderError::UnknownByteOrder(_))
        ));
        assert_eq!(ByteOrder::BigEndian.to_string(), "motorola");
        assert_eq!(
            "intel_payload".parse::<ByteOrder>().unwrap(),
            ByteOrder::LittleEndianPayload
        );
    }

    #[test]
    fn test_signal_encode_uses_scaling() {
        let spec = SignalSpec::new("UHS_Maximum", 32, 16).with_scaling(0.03125, 0.0);
        let field = spec.encode(12.5).unwrap();
        // 12.5 / 0.03125 = 400 = 0x190
        assert_eq!(field.mask, 0x0000_FFFF_0000_0000);
        assert_eq!(field.value_bits, 0x0000_0190_0000_0000);
    }
}
