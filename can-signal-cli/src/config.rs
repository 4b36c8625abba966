//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_signal_encoder::EncoderConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub csv_files: Vec<PathBuf>,
    #[serde(default)]
    pub dbc_files: Vec<PathBuf>,
    /// JSON-lines file with update messages (default: stdin)
    pub updates: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesConfig {
    /// CAN ID per message, for CSV tables without a `CanId` column
    #[serde(default)]
    pub can_ids: HashMap<String, u32>,
    /// Only load these messages
    pub only: Option<Vec<String>>,
    #[serde(default = "default_message_size")]
    pub default_size: usize,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            can_ids: HashMap::new(),
            only: None,
            default_size: default_message_size(),
        }
    }
}

fn default_message_size() -> usize {
    8
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Output file (default: stdout)
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub parallel: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per frame
    #[default]
    Json,
    /// Packed 16-byte shared-memory records
    Record,
}

impl AppConfig {
    /// Encoder settings for the table loaders
    pub fn encoder_config(&self) -> EncoderConfig {
        let mut config = EncoderConfig::new().with_default_message_size(self.messages.default_size);
        config.can_ids = self.messages.can_ids.clone();
        config.message_filter = self.messages.only.clone();
        config
    }

    /// Make relative paths relative to the directory holding the config file
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        self.input.csv_files.iter_mut().for_each(resolve);
        self.input.dbc_files.iter_mut().for_each(resolve);
        self.input.updates.iter_mut().for_each(resolve);
        self.output.path.iter_mut().for_each(resolve);
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            csv_files = ["signals.csv"]
            dbc_files = ["powertrain.dbc"]

            [messages]
            only = ["BDC6_State_Request"]

            [messages.can_ids]
            BDC6_State_Request = 0x308
            BDC6_HS_Value_Limits = 824

            [output]
            format = "record"
            parallel = true
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.csv_files.len(), 1);
        assert_eq!(config.input.dbc_files.len(), 1);
        assert_eq!(config.output.format, OutputFormat::Record);
        assert!(config.output.parallel);

        let encoder_config = config.encoder_config();
        assert_eq!(encoder_config.can_id("BDC6_State_Request"), Some(0x308));
        assert_eq!(encoder_config.can_id("BDC6_HS_Value_Limits"), Some(0x338));
        assert!(encoder_config.should_load_message("BDC6_State_Request"));
        assert!(!encoder_config.should_load_message("BDC6_HS_Value_Limits"));
        assert_eq!(encoder_config.default_message_size, 8);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.input.csv_files.is_empty());
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.messages.default_size, 8);
        assert!(config.output.path.is_none());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let result: std::result::Result<AppConfig, _> = toml::from_str("[output]\nformat = \"xml\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_resolves_relative_paths() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[input]\ncsv_files = [\"signals.csv\", \"/abs/other.csv\"]").unwrap();
        writeln!(file, "[output]\npath = \"frames.jsonl\"").unwrap();
        file.flush().unwrap();

        let config = load_config(file.path()).unwrap();
        let base = file.path().parent().unwrap();

        assert_eq!(config.input.csv_files[0], base.join("signals.csv"));
        assert_eq!(config.input.csv_files[1], PathBuf::from("/abs/other.csv"));
        assert_eq!(config.output.path, Some(base.join("frames.jsonl")));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
