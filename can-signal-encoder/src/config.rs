//! Encoder configuration types
//!
//! This module defines what the table loaders need beyond the table files
//! themselves: CAN IDs for tables that do not carry them, which messages to
//! keep, and the default payload size.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for loading signal tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// CAN ID per message name, for CSV tables without a `CanId` column
    #[serde(default)]
    pub can_ids: HashMap<String, u32>,

    /// Optional: only load these messages
    #[serde(default)]
    pub message_filter: Option<Vec<String>>,

    /// Payload size in bytes for messages whose table does not say
    #[serde(default = "default_message_size")]
    pub default_message_size: usize,
}

fn default_message_size() -> usize {
    8
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            can_ids: HashMap::new(),
            message_filter: None,
            default_message_size: default_message_size(),
        }
    }
}

impl EncoderConfig {
    /// Create a new encoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: map a message name to its CAN ID
    pub fn add_can_id(mut self, message: impl Into<String>, can_id: u32) -> Self {
        self.can_ids.insert(message.into(), can_id);
        self
    }

    /// Builder method: set message filter
    pub fn with_message_filter(mut self, messages: Vec<String>) -> Self {
        self.message_filter = Some(messages);
        self
    }

    /// Builder method: set the default payload size
    pub fn with_default_message_size(mut self, size: usize) -> Self {
        self.default_message_size = size;
        self
    }

    /// Check if a message should be loaded
    pub fn should_load_message(&self, name: &str) -> bool {
        match &self.message_filter {
            Some(messages) => messages.iter().any(|m| m == name),
            None => true,
        }
    }

    /// CAN ID configured for a message
    pub fn can_id(&self, name: &str) -> Option<u32> {
        self.can_ids.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_config_builder() {
        let config = EncoderConfig::new()
            .add_can_id("State_Request", 0x308)
            .add_can_id("HS_Value_Limits", 0x338)
            .with_message_filter(vec!["State_Request".to_string()])
            .with_default_message_size(4);

        assert_eq!(config.can_id("State_Request"), Some(0x308));
        assert_eq!(config.can_id("Unknown"), None);
        assert_eq!(config.default_message_size, 4);
    }

    #[test]
    fn test_filter_logic() {
        let config = EncoderConfig::new().with_message_filter(vec!["A".to_string(), "B".to_string()]);

        assert!(config.should_load_message("A"));
        assert!(config.should_load_message("B"));
        assert!(!config.should_load_message("C"));
    }

    #[test]
    fn test_no_filters() {
        let config = EncoderConfig::new();

        // Without filters, everything should pass
        assert!(config.should_load_message("Anything"));
        assert_eq!(config.default_message_size, 8);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: EncoderConfig =
            serde_json::from_str(r#"{"can_ids": {"State_Request": 776}}"#).unwrap();
        assert_eq!(config.can_id("State_Request"), Some(0x308));
        assert!(config.message_filter.is_none());
        assert_eq!(config.default_message_size, 8);
    }
}
