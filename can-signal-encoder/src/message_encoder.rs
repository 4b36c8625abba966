//! Frame Composition Engine
//!
//! Folds the signal values of one update into a single frame using the
//! message's signal table. There is one generic composer for every message;
//! message-specific behavior comes only from the table.

use crate::signals::database::{MessageDefinition, SignalSpec};
use crate::types::{BitField, EncoderError, Frame, FrameUpdate, Result, UpdateRequest};

/// Message encoder - packs signal values into CAN frames
pub struct MessageEncoder;

impl MessageEncoder {
    /// Compose a frame for one update, starting from an all-zero payload
    ///
    /// # Arguments
    /// * `message_def` - Message definition from the signal table
    /// * `update` - Signal values in caller order plus transmission hints
    ///
    /// # Returns
    /// * `FrameUpdate` with the rendered payload and the hints passed through
    /// * `Err` carrying the message and signal name if any known signal fails;
    ///   no partial frame is produced
    /// * `InvalidConfig` if the definition fails [`MessageDefinition::validate`]
    pub fn compose_frame(message_def: &MessageDefinition, update: &UpdateRequest) -> Result<FrameUpdate> {
        let frame = Self::compose_onto(Frame::new(message_def.size), message_def, update)?;

        log::debug!(
            "Composed {} (ID 0x{:X}): {}",
            message_def.name,
            message_def.id,
            frame.to_hex()
        );

        Ok(FrameUpdate {
            message: message_def.name.clone(),
            can_id: message_def.id,
            raw_frame: frame.to_hex(),
            hints: update.hints,
            frame,
        })
    }

    /// Fold an update onto an existing frame
    ///
    /// Signals are applied in the update's order. Unknown names are skipped.
    /// Where two fields overlap, the one applied last owns the shared bits.
    pub fn compose_onto(
        initial: Frame,
        message_def: &MessageDefinition,
        update: &UpdateRequest,
    ) -> Result<Frame> {
        // Fields past `size` would be cut from the rendered payload
        message_def.validate()?;

        let mut frame = initial;

        for (name, value) in &update.values {
            let Some(signal) = message_def.signal(name) else {
                log::trace!("Ignoring '{}': not a signal of {}", name, message_def.name);
                continue;
            };

            let field = Self::encode_signal(message_def, signal, *value)?;
            frame.apply(&field);
        }

        Ok(frame)
    }

    /// Encode one physical value, attaching message/signal context to failures
    pub fn encode_signal(
        message_def: &MessageDefinition,
        signal: &SignalSpec,
        physical: f64,
    ) -> Result<BitField> {
        let field = signal
            .encode(physical)
            .map_err(|e| Self::with_context(message_def, signal, physical, e))?;

        log::trace!(
            "{}.{} = {} -> mask 0x{:016X} bits 0x{:016X}",
            message_def.name,
            signal.name,
            physical,
            field.mask,
            field.value_bits
        );

        Ok(field)
    }

    fn with_context(
        message_def: &MessageDefinition,
        signal: &SignalSpec,
        value: f64,
        source: EncoderError,
    ) -> EncoderError {
        EncoderError::SignalEncoding {
            message: message_def.name.clone(),
            signal: signal.name.clone(),
            value,
            source: Box::new(source),
        }
    }
}
