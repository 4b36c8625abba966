//! Signal table and CSV/DBC parsers
//!
//! This module contains parsers for signal definition files (CSV, DBC)
//! and the unified signal table.

pub mod csv;
pub mod database;
pub mod dbc;

// Re-export key types for convenience
pub use database::{
    ByteOrder, DatabaseStats, MessageDefinition, SignalDatabase, SignalSpec, ValueType,
};
