//! CAN Signal Encoder Library
//!
//! A stateless, reusable library for turning physical signal values into CAN
//! frame payloads, with signal definitions from CSV tables and DBC files.
//!
//! # Architecture
//!
//! Leaf-first layers:
//! - [`scalar`] clamps a physical value and inverse-applies factor/offset
//! - [`bits`] places a raw integer into its intel or motorola bit field
//! - [`MessageEncoder`] folds the fields of one update into a single frame
//! - [`signals`] holds the message tables and their CSV/DBC loaders
//! - [`extract`] reads signal values and hints out of loosely shaped JSON updates
//! - [`sink`] serializes composed frames for the sender
//!
//! The library does NOT:
//! - Put frames on a bus
//! - Schedule cyclic resends or deduplicate transmissions
//! - Decode frames back into physical values
//!
//! Command-line handling lives in the application layer (can-signal-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use can_signal_encoder::{Encoder, EncoderConfig, UpdateRequest};
//! use std::path::Path;
//!
//! // Load signal tables
//! let config = EncoderConfig::new().add_can_id("BDC6_HS_Value_Limits", 0x338);
//! let mut encoder = Encoder::new();
//! encoder.add_csv(Path::new("signals.csv"), &config).unwrap();
//! encoder.add_dbc(Path::new("powertrain.dbc"), &config).unwrap();
//!
//! // Compose one frame
//! let update = UpdateRequest::new()
//!     .with_value("UHS_Maximum", 400.0)
//!     .with_value("IHS_Maximum", 120.5)
//!     .with_interval_ms(100)
//!     .with_cyclic(true);
//!
//! match encoder.compose("BDC6_HS_Value_Limits", &update) {
//!     Ok(frame) => println!("{}", frame),
//!     Err(e) => eprintln!("Encode error: {}", e),
//! }
//! ```

// Public modules
pub mod bits;
pub mod config;
pub mod encoder;
pub mod extract;
pub mod message_encoder;
pub mod scalar;
pub mod signals;
pub mod sink;
pub mod types;

// Re-export main types for convenience
pub use config::EncoderConfig;
pub use encoder::Encoder;
pub use message_encoder::MessageEncoder;
pub use signals::{
    ByteOrder, DatabaseStats, MessageDefinition, SignalDatabase, SignalSpec, ValueType,
};
pub use sink::{FrameSink, JsonLinesSink, RecordSink, ShmRecord, VecSink};
pub use types::{
    BitField, EncoderError, Frame, FrameUpdate, Result, SignalInput, SignalUpdate,
    TransmitHints, UpdateRequest,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: ensure we can create an encoder
        let encoder = Encoder::new();
        let stats = encoder.database_stats();
        assert_eq!(stats.num_messages, 0);
        assert!(!VERSION.is_empty());
    }
}
