//! Main encoder API
//!
//! This module provides the primary interface for the encoder library.
//! The Encoder struct is the entry point for loading signal tables and
//! composing frames from update messages.

use crate::config::EncoderConfig;
use crate::extract;
use crate::message_encoder::MessageEncoder;
use crate::signals::{DatabaseStats, MessageDefinition, SignalDatabase};
use crate::types::{
    EncoderError, FrameUpdate, Result, SignalInput, SignalUpdate, UpdateRequest,
};
use serde_json::Value;
use std::path::Path;

/// The main encoder struct - entry point for all encoding operations
pub struct Encoder {
    /// Internal signal table (loaded from CSV/DBC files or built in code)
    signal_db: SignalDatabase,
}

impl Encoder {
    /// Create a new encoder instance
    pub fn new() -> Self {
        Self {
            signal_db: SignalDatabase::new(),
        }
    }

    /// Load a CSV signal table and add its messages
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file
    /// * `config` - CAN IDs for messages the table does not map, plus filters
    ///
    /// # Example
    /// ```no_run
    /// use can_signal_encoder::{Encoder, EncoderConfig};
    /// use std::path::Path;
    ///
    /// let config = EncoderConfig::new().add_can_id("BDC6_State_Request", 0x308);
    /// let mut encoder = Encoder::new();
    /// encoder.add_csv(Path::new("signals.csv"), &config).unwrap();
    /// ```
    pub fn add_csv(&mut self, path: &Path, config: &EncoderConfig) -> Result<()> {
        log::info!("Loading CSV signal table: {:?}", path);

        let messages = crate::signals::csv::parse_csv_file(path, config)?;
        self.add_messages(messages)?;

        log::info!("CSV signal table loaded successfully: {:?}", path);
        Ok(())
    }

    /// Load a DBC file and add its messages
    ///
    /// # Example
    /// ```no_run
    /// use can_signal_encoder::{Encoder, EncoderConfig};
    /// use std::path::Path;
    ///
    /// let mut encoder = Encoder::new();
    /// encoder.add_dbc(Path::new("powertrain.dbc"), &EncoderConfig::new()).unwrap();
    /// ```
    pub fn add_dbc(&mut self, path: &Path, config: &EncoderConfig) -> Result<()> {
        log::info!("Loading DBC file: {:?}", path);

        let messages = crate::signals::dbc::parse_dbc_file(path, config)?;
        self.add_messages(messages)?;

        log::info!("DBC file loaded successfully: {:?}", path);
        Ok(())
    }

    /// Validate and register a single message definition
    pub fn add_message(&mut self, message: MessageDefinition) -> Result<()> {
        self.signal_db.add_message(message)
    }

    /// Register a whole file's messages, or none of them
    fn add_messages(&mut self, messages: Vec<MessageDefinition>) -> Result<()> {
        for message in &messages {
            message.validate()?;
        }
        for message in messages {
            self.signal_db.add_message(message)?;
        }
        Ok(())
    }

    /// Look up a loaded message definition
    pub fn message(&self, name: &str) -> Option<&MessageDefinition> {
        self.signal_db.get_message(name)
    }

    /// Compose one frame for a named message
    ///
    /// # Returns
    /// * `Err(MessageNotFound)` if no table defines the message
    /// * `Err(SignalEncoding)` if any known signal fails to encode
    pub fn compose(&self, message: &str, update: &UpdateRequest) -> Result<FrameUpdate> {
        let definition = self
            .signal_db
            .get_message(message)
            .ok_or_else(|| EncoderError::MessageNotFound(message.to_string()))?;

        MessageEncoder::compose_frame(definition, update)
    }

    /// Compose a frame from a JSON update message naming its target
    ///
    /// The message is taken from `message`, falling back to `topic`.
    pub fn compose_json(&self, msg: &Value) -> Result<FrameUpdate> {
        let message = extract::message_name(msg).ok_or_else(|| {
            EncoderError::MessageNotFound("update carries no 'message' or 'topic'".to_string())
        })?;

        self.compose_json_for(message, msg)
    }

    /// Compose a frame for a fixed message from a JSON update message
    pub fn compose_json_for(&self, message: &str, msg: &Value) -> Result<FrameUpdate> {
        let update = UpdateRequest::from_json(msg);
        self.compose(message, &update)
    }

    /// Encode one signal on its own
    ///
    /// A physical value goes through the scalar codec; a raw `value_bits`
    /// input is packed as-is. Without either, only the layout is reported.
    pub fn encode_signal(
        &self,
        message: &str,
        signal: &str,
        input: &SignalInput,
    ) -> Result<SignalUpdate> {
        let definition = self
            .signal_db
            .get_message(message)
            .ok_or_else(|| EncoderError::MessageNotFound(message.to_string()))?;
        let spec = definition
            .signal(signal)
            .ok_or_else(|| EncoderError::SignalNotFound(format!("{}.{}", message, signal)))?;

        let field = match (input.value_phys, input.value_bits) {
            (Some(physical), _) => Some(MessageEncoder::encode_signal(definition, spec, physical)?),
            (None, Some(bits)) => {
                let field = spec.pack_raw(i128::from(bits)).map_err(|e| {
                    EncoderError::SignalEncoding {
                        message: definition.name.clone(),
                        signal: spec.name.clone(),
                        value: bits as f64,
                        source: Box::new(e),
                    }
                })?;
                Some(field)
            }
            (None, None) => None,
        };

        let mask = spec.pack_raw(0)?.mask;
        let value_bits = field.map_or(0, |f| f.value_bits);

        Ok(SignalUpdate {
            message: definition.name.clone(),
            signal: spec.name.clone(),
            can_id: definition.id,
            mask_hex: format!("0x{:x}", mask),
            value_bits_hex: format!("0x{:x}", value_bits),
            unit: spec.unit.clone().unwrap_or_default(),
            factor: spec.factor,
            offset: spec.offset,
            signed: spec.is_signed(),
            start_bit: spec.start_bit,
            bit_length: spec.length,
            byte_order: spec.byte_order.to_string(),
            value_phys: input.value_phys,
            value_bits: input.value_bits,
            hints: input.hints,
        })
    }

    /// Encode one signal from a JSON update message
    pub fn encode_signal_json(&self, message: &str, signal: &str, msg: &Value) -> Result<SignalUpdate> {
        self.encode_signal(message, signal, &SignalInput::from_json(msg))
    }

    /// Get statistics about the loaded signal tables
    pub fn database_stats(&self) -> DatabaseStats {
        self.signal_db.stats()
    }

    /// Names of all loaded messages, sorted
    pub fn message_names(&self) -> Vec<&str> {
        self.signal_db.message_names()
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
