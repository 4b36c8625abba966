//! DBC file parser
//!
//! Parses Vector DBC files and converts them into our internal signal table format.

use crate::config::EncoderConfig;
use crate::signals::database::{ByteOrder, MessageDefinition, SignalSpec, ValueType};
use crate::types::{EncoderError, Result};
use std::path::Path;

/// Bit 31 of a DBC message ID marks an extended (29-bit) frame
const EXTENDED_ID_FLAG: u32 = 0x8000_0000;
const CAN_ID_MASK: u32 = 0x1FFF_FFFF;

/// Pseudo-message DBC editors use to hold unassigned signals
const INDEPENDENT_SIGNALS_MESSAGE: &str = "VECTOR__INDEPENDENT_SIG_MSG";

/// Parse a DBC file and return message definitions
pub fn parse_dbc_file(path: &Path, config: &EncoderConfig) -> Result<Vec<MessageDefinition>> {
    log::info!("Parsing DBC file: {:?}", path);

    // Read the DBC file as bytes first (handle non-UTF8 encodings)
    let bytes = std::fs::read(path).map_err(|e| {
        EncoderError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc")
        .to_string();

    let messages = parse_dbc_bytes(bytes, &source, config)?;

    log::info!("Parsed {} messages from {:?}", messages.len(), path);

    Ok(messages)
}

/// Parse DBC content held in memory
pub fn parse_dbc_bytes(
    bytes: Vec<u8>,
    source: &str,
    config: &EncoderConfig,
) -> Result<Vec<MessageDefinition>> {
    // Try UTF-8 first, then fallback to Latin-1/Windows-1252 encoding
    let dbc_content = String::from_utf8(bytes).unwrap_or_else(|e| {
        log::warn!("{} is not UTF-8, trying Latin-1 encoding", source);
        e.into_bytes().iter().map(|&b| b as char).collect()
    });

    // Parse using can-dbc crate
    let dbc = can_dbc::DBC::from_slice(dbc_content.as_bytes()).map_err(|e| {
        EncoderError::DbcParseError(format!("Failed to parse DBC file {}: {:?}", source, e))
    })?;

    let mut messages = Vec::new();

    for dbc_msg in dbc.messages() {
        let name = dbc_msg.message_name();
        if name == INDEPENDENT_SIGNALS_MESSAGE {
            log::trace!("Skipping {} in {}", name, source);
            continue;
        }
        if !config.should_load_message(name) {
            continue;
        }

        let size = *dbc_msg.message_size() as usize;
        if size == 0 || size > 8 {
            log::warn!(
                "{}: skipping message '{}' with {}-byte payload, frames hold 1 to 8 bytes",
                source,
                name,
                size
            );
            continue;
        }

        messages.push(convert_message(&dbc, dbc_msg, source)?);
    }

    Ok(messages)
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    source: &str,
) -> Result<MessageDefinition> {
    let message_id = dbc_msg.message_id();

    let signals = dbc_msg
        .signals()
        .iter()
        .map(|dbc_sig| {
            let mut signal = convert_signal(dbc_sig).map_err(|e| {
                EncoderError::InvalidConfig(format!(
                    "{}: message '{}': {}",
                    source,
                    dbc_msg.message_name(),
                    e
                ))
            })?;
            signal.comment = signal_comment(dbc, message_id, dbc_sig.name());
            Ok(signal)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MessageDefinition {
        id: strip_extended_flag(message_id.0),
        name: dbc_msg.message_name().to_string(),
        size: *dbc_msg.message_size() as usize,
        sender: match dbc_msg.transmitter() {
            can_dbc::Transmitter::NodeName(name) => Some(name.to_string()),
            _ => None,
        },
        signals,
        source: source.to_string(),
    })
}

/// Convert a can-dbc signal to our SignalSpec
///
/// Multiplexed signals become plain signals; the caller decides which
/// multiplexed values to send alongside the multiplexor.
fn convert_signal(dbc_sig: &can_dbc::Signal) -> Result<SignalSpec> {
    // `@1` counts bits from payload byte 0
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndianPayload,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    // Determine value type
    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    // [0|0] means no range was given
    let (min, max) = match (*dbc_sig.min(), *dbc_sig.max()) {
        (min, max) if min == 0.0 && max == 0.0 => (None, None),
        (min, max) => (Some(min), Some(max)),
    };

    Ok(SignalSpec {
        name: dbc_sig.name().to_string(),
        start_bit: bit_number(*dbc_sig.start_bit(), "start bit", dbc_sig.name())?,
        length: bit_number(*dbc_sig.signal_size(), "length", dbc_sig.name())?,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        min,
        max,
        unit: if dbc_sig.unit().is_empty() {
            None
        } else {
            Some(dbc_sig.unit().to_string())
        },
        comment: None,
    })
}

/// Narrow a DBC bit position or size, rejecting values that do not fit
fn bit_number(value: u64, what: &str, signal: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| {
        EncoderError::InvalidConfig(format!(
            "signal '{}' has {} {}, too large for a CAN frame",
            signal, what, value
        ))
    })
}

fn signal_comment(
    dbc: &can_dbc::DBC,
    message_id: &can_dbc::MessageId,
    signal_name: &str,
) -> Option<String> {
    dbc.comments().iter().find_map(|comment| match comment {
        can_dbc::Comment::Signal {
            message_id: id,
            signal_name: name,
            comment,
        } if id == message_id && name == signal_name => Some(comment.clone()),
        _ => None,
    })
}

fn strip_extended_flag(raw_id: u32) -> u32 {
    if raw_id & EXTENDED_ID_FLAG != 0 {
        raw_id & CAN_ID_MASK
    } else {
        raw_id
    }
}
