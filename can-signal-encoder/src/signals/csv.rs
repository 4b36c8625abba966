//! CSV signal table parser
//!
//! Reads signal tables with one row per signal:
//!
//! ```text
//! Message, Signal, StartBit, Length, Scale, Offset, Min, Max, Unit, Comment
//! ```
//!
//! Optional columns: `Signed` (true/1/yes), `ByteOrder` (intel|motorola) and
//! `CanId` (decimal or `0x` hex). Header names are case-insensitive.

use crate::config::EncoderConfig;
use crate::signals::database::{ByteOrder, MessageDefinition, SignalSpec, ValueType};
use crate::types::{EncoderError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

const REQUIRED_COLUMNS: &[&str] = &["message", "signal", "startbit", "length"];

/// Parse a CSV signal table and return message definitions
pub fn parse_csv_file(path: &Path, config: &EncoderConfig) -> Result<Vec<MessageDefinition>> {
    log::info!("Parsing CSV signal table: {:?}", path);

    let file = std::fs::File::open(path).map_err(|e| {
        EncoderError::CsvParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string();

    let messages = parse_csv_reader(file, &source, config)?;

    log::info!("Parsed {} messages from {:?}", messages.len(), path);

    Ok(messages)
}

/// Parse a CSV signal table from any reader
///
/// `source` names the table in error messages and in
/// [`MessageDefinition::source`].
pub fn parse_csv_reader<R: Read>(
    reader: R,
    source: &str,
    config: &EncoderConfig,
) -> Result<Vec<MessageDefinition>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| EncoderError::CsvParseError(format!("{}: {}", source, e)))?;
    let columns = Columns::from_headers(headers);
    columns.require(source)?;

    let mut table = TableBuilder::default();

    for result in reader.records() {
        let record =
            result.map_err(|e| EncoderError::CsvParseError(format!("{}: {}", source, e)))?;
        let line = record.position().map_or(0, |p| p.line());

        let message = columns.get(&record, "message");
        let signal = columns.get(&record, "signal");
        if message.is_empty() || signal.is_empty() {
            continue;
        }

        if !config.should_load_message(message) {
            continue;
        }

        let row = Row {
            source,
            line,
            columns: &columns,
            record: &record,
        };

        let spec = row.signal_spec(signal)?;
        let can_id = row.can_id()?;
        table.push(message, can_id, spec, source, line)?;
    }

    Ok(table.finish(source, config))
}

/// Lower-cased header name to column index
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_ascii_lowercase(), i))
            .collect();
        Self { index }
    }

    fn require(&self, source: &str) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| !self.index.contains_key(*name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EncoderError::CsvParseError(format!(
                "{}: missing column(s) {}",
                source,
                missing.join(", ")
            )))
        }
    }

    /// Cell value, or "" when the column or cell is absent
    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> &'r str {
        self.index
            .get(name)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
    }
}

/// One data row with its location, for error messages
struct Row<'a> {
    source: &'a str,
    line: u64,
    columns: &'a Columns,
    record: &'a StringRecord,
}

impl Row<'_> {
    fn cell(&self, name: &str) -> &str {
        self.columns.get(self.record, name)
    }

    fn invalid(&self, detail: impl std::fmt::Display) -> EncoderError {
        EncoderError::InvalidConfig(format!("{} line {}: {}", self.source, self.line, detail))
    }

    fn parse<T: std::str::FromStr>(&self, column: &str, label: &str) -> Result<T> {
        let text = self.cell(column);
        text.parse()
            .map_err(|_| self.invalid(format!("invalid {} '{}'", label, text)))
    }

    fn optional_f64(&self, column: &str, label: &str) -> Result<Option<f64>> {
        if self.cell(column).is_empty() {
            Ok(None)
        } else {
            self.parse(column, label).map(Some)
        }
    }

    fn signal_spec(&self, name: &str) -> Result<SignalSpec> {
        let start_bit: u16 = self.parse("startbit", "StartBit")?;
        let length: u16 = self.parse("length", "Length")?;
        let factor = self.optional_f64("scale", "Scale")?.unwrap_or(1.0);
        let offset = self.optional_f64("offset", "Offset")?.unwrap_or(0.0);
        let min = self.optional_f64("min", "Min")?;
        let max = self.optional_f64("max", "Max")?;

        let byte_order = match self.cell("byteorder") {
            "" => ByteOrder::LittleEndian,
            text => text.parse().map_err(|e| self.invalid(e))?,
        };

        let value_type = if parse_flag(self.cell("signed")) {
            ValueType::Signed
        } else {
            ValueType::Unsigned
        };

        let mut spec = SignalSpec::new(name, start_bit, length)
            .with_scaling(factor, offset)
            .with_range(min, max)
            .with_byte_order(byte_order)
            .with_value_type(value_type);

        let unit = self.cell("unit");
        if !unit.is_empty() {
            spec.unit = Some(unit.to_string());
        }
        let comment = self.cell("comment");
        if !comment.is_empty() {
            spec.comment = Some(comment.to_string());
        }

        spec.validate()
            .map_err(|e| self.invalid(format!("signal '{}': {}", name, e)))?;

        Ok(spec)
    }

    fn can_id(&self) -> Result<Option<u32>> {
        match self.cell("canid") {
            "" => Ok(None),
            text => parse_can_id(text)
                .map(Some)
                .ok_or_else(|| self.invalid(format!("invalid CanId '{}'", text))),
        }
    }
}

/// Messages in first-seen order, with the CAN ID taken from the table
#[derive(Default)]
struct TableBuilder {
    order: Vec<(MessageDefinition, Option<u32>)>,
    by_name: HashMap<String, usize>,
}

impl TableBuilder {
    fn push(
        &mut self,
        message: &str,
        can_id: Option<u32>,
        spec: SignalSpec,
        source: &str,
        line: u64,
    ) -> Result<()> {
        let index = match self.by_name.get(message) {
            Some(&i) => i,
            None => {
                let mut definition = MessageDefinition::new(0, message);
                definition.source = source.to_string();
                self.order.push((definition, None));
                self.by_name.insert(message.to_string(), self.order.len() - 1);
                self.order.len() - 1
            }
        };

        let (definition, table_id) = &mut self.order[index];

        if let Some(id) = can_id {
            match *table_id {
                Some(existing) if existing != id => {
                    return Err(EncoderError::InvalidConfig(format!(
                        "{} line {}: message '{}' has CanId 0x{:X} but an earlier row says 0x{:X}",
                        source, line, message, id, existing
                    )));
                }
                _ => *table_id = Some(id),
            }
        }

        if let Some(existing) = definition.signals.iter_mut().find(|s| s.name == spec.name) {
            log::warn!(
                "{} line {}: signal '{}.{}' defined twice, keeping the later row",
                source,
                line,
                message,
                spec.name
            );
            *existing = spec;
        } else {
            definition.signals.push(spec);
        }

        Ok(())
    }

    fn finish(self, source: &str, config: &EncoderConfig) -> Vec<MessageDefinition> {
        self.order
            .into_iter()
            .filter_map(|(mut definition, table_id)| {
                let Some(id) = table_id.or_else(|| config.can_id(&definition.name)) else {
                    log::warn!(
                        "{}: no CAN ID for message '{}', skipping {} signal(s)",
                        source,
                        definition.name,
                        definition.signals.len()
                    );
                    return None;
                };
                definition.id = id;
                definition.size = config.default_message_size;
                Some(definition)
            })
            .collect()
    }
}

fn parse_flag(text: &str) -> bool {
    matches!(text.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Parse a CAN ID given in decimal or `0x` hex
pub fn parse_can_id(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BDC_TABLE: &str = "\
Message,Signal,StartBit,Length,Scale,Offset,Min,Max,Unit,Comment
BDC6_State_Request,State,0,4,1,0,0,15,,Requested state
BDC6_State_Request,Control_Mode,4,3,,,0,7,,
BDC6_HS_Value_Limits,IHS_Maximum,0,16,0.03125,-1024,-1024,1023.96875,A,
BDC6_HS_Value_Limits,UHS_Maximum,32,16,0.03125,0,0,2047.96875,V,
";

    fn config() -> EncoderConfig {
        EncoderConfig::new()
            .add_can_id("BDC6_State_Request", 0x308)
            .add_can_id("BDC6_HS_Value_Limits", 0x338)
    }

    fn parse(text: &str, config: &EncoderConfig) -> Result<Vec<MessageDefinition>> {
        parse_csv_reader(text.as_bytes(), "signals.csv", config)
    }

    #[test]
    fn test_parse_csv_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BDC_TABLE.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let messages = parse_csv_file(temp_file.path(), &config()).unwrap();
        assert_eq!(messages.len(), 2);

        let state = &messages[0];
        assert_eq!(state.name, "BDC6_State_Request");
        assert_eq!(state.id, 0x308);
        assert_eq!(state.size, 8);
        assert_eq!(state.signals.len(), 2);
        assert_eq!(state.signals[0].comment.as_deref(), Some("Requested state"));

        // Empty Scale/Offset fall back to identity scaling
        let mode = &state.signals[1];
        assert_eq!(mode.factor, 1.0);
        assert_eq!(mode.offset, 0.0);
        assert_eq!(mode.max, Some(7.0));

        let limits = &messages[1];
        assert_eq!(limits.id, 0x338);
        let ihs = limits.signal("IHS_Maximum").unwrap();
        assert_eq!(ihs.factor, 0.03125);
        assert_eq!(ihs.offset, -1024.0);
        assert_eq!(ihs.unit.as_deref(), Some("A"));
        assert_eq!(ihs.byte_order, ByteOrder::LittleEndian);
        assert_eq!(ihs.value_type, ValueType::Unsigned);
    }

    #[test]
    fn test_headers_are_case_insensitive_and_cells_trimmed() {
        let text = "\
MESSAGE , signal,startBIT,LENGTH,Signed,ByteOrder,CanId
 Motohawk ,Temperature, 0 ,12,yes, Motorola ,0x1F0
";
        let messages = parse(text, &EncoderConfig::new()).unwrap();
        let signal = &messages[0].signals[0];

        assert_eq!(messages[0].name, "Motohawk");
        assert_eq!(messages[0].id, 0x1F0);
        assert_eq!(signal.start_bit, 0);
        assert_eq!(signal.length, 12);
        assert_eq!(signal.value_type, ValueType::Signed);
        assert_eq!(signal.byte_order, ByteOrder::BigEndian);
        assert_eq!(signal.min, None);
        assert_eq!(signal.max, None);
    }

    #[test]
    fn test_can_id_column_overrides_config() {
        let text = "\
Message,Signal,StartBit,Length,CanId
BDC6_State_Request,State,0,4,777
BDC6_State_Request,IMD,8,1,
";
        let messages = parse(text, &config()).unwrap();
        assert_eq!(messages[0].id, 777);
        assert_eq!(messages[0].signals.len(), 2);
    }

    #[test]
    fn test_conflicting_can_ids_are_rejected() {
        let text = "\
Message,Signal,StartBit,Length,CanId
M,A,0,4,0x100
M,B,4,4,0x101
";
        let err = parse(text, &EncoderConfig::new()).unwrap_err();
        assert!(matches!(err, EncoderError::InvalidConfig(_)));
    }

    #[test]
    fn test_message_without_can_id_is_skipped() {
        let text = "\
Message,Signal,StartBit,Length
BDC6_State_Request,State,0,4
Unmapped,Thing,0,8
";
        let messages = parse(text, &config()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].name, "BDC6_State_Request");
    }

    #[test]
    fn test_rows_without_names_are_skipped() {
        let text = "\
Message,Signal,StartBit,Length
,Orphan,0,4
BDC6_State_Request,,0,4
,,,
BDC6_State_Request,State,0,4
";
        let messages = parse(text, &config()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].signals.len(), 1);
    }

    #[test]
    fn test_message_filter() {
        let config = config().with_message_filter(vec!["BDC6_HS_Value_Limits".to_string()]);
        let messages = parse(BDC_TABLE, &config).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].name, "BDC6_HS_Value_Limits");
    }

    #[test]
    fn test_default_message_size_from_config() {
        let config = config().with_default_message_size(4);
        let text = "Message,Signal,StartBit,Length\nBDC6_State_Request,State,56,4\n";
        let messages = parse(text, &config).unwrap();
        assert_eq!(messages[0].size, 4);
    }

    #[test]
    fn test_malformed_rows_name_the_line() {
        let text = "Message,Signal,StartBit,Length,Scale\nM,S,zero,4,1\n";
        let err = parse(text, &config()).unwrap_err();
        match err {
            EncoderError::InvalidConfig(msg) => {
                assert!(msg.contains("signals.csv line 2"), "{msg}");
                assert!(msg.contains("StartBit"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let zero_factor = "Message,Signal,StartBit,Length,Scale\nM,S,0,4,0\n";
        assert!(matches!(
            parse(zero_factor, &config()),
            Err(EncoderError::InvalidConfig(_))
        ));

        let bad_range = "Message,Signal,StartBit,Length,Min,Max\nM,S,0,4,10,1\n";
        assert!(matches!(
            parse(bad_range, &config()),
            Err(EncoderError::InvalidConfig(_))
        ));

        let bad_order = "Message,Signal,StartBit,Length,ByteOrder\nM,S,0,4,middle\n";
        assert!(matches!(
            parse(bad_order, &config()),
            Err(EncoderError::InvalidConfig(_))
        ));

        let off_frame = "Message,Signal,StartBit,Length\nM,S,60,8\n";
        assert!(matches!(
            parse(off_frame, &config()),
            Err(EncoderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_required_column() {
        let text = "Message,Signal,Length\nM,S,4\n";
        assert!(matches!(
            parse(text, &config()),
            Err(EncoderError::CsvParseError(_))
        ));

        assert!(matches!(
            parse("", &config()),
            Err(EncoderError::CsvParseError(_))
        ));
    }

    #[test]
    fn test_duplicate_signal_keeps_later_row() {
        let text = "\
Message,Signal,StartBit,Length
BDC6_State_Request,State,0,4
BDC6_State_Request,State,4,4
";
        let messages = parse(text, &config()).unwrap();
        assert_eq!(messages[0].signals.len(), 1);
        assert_eq!(messages[0].signals[0].start_bit, 4);
    }

    #[test]
    fn test_parse_can_id() {
        assert_eq!(parse_can_id("776"), Some(776));
        assert_eq!(parse_can_id("0x308"), Some(0x308));
        assert_eq!(parse_can_id("0X1f0"), Some(0x1F0));
        assert_eq!(parse_can_id("0xZZ"), None);
        assert_eq!(parse_can_id("-1"), None);
    }
}
