//! Output sinks
//!
//! The encoder hands every composed frame to a [`FrameSink`]. Putting frames on
//! a bus and resending cyclic frames is the job of the external sender; the
//! sinks here only serialize the boundary struct.

use crate::types::{FrameUpdate, Result};
use byteorder::{ByteOrder as _, LittleEndian};
use std::io::Write;

/// Size of one shared-memory record in bytes
pub const SHM_RECORD_SIZE: usize = 16;

/// Consumer of composed frames
pub trait FrameSink {
    /// Deliver one frame update
    fn publish(&mut self, update: &FrameUpdate) -> Result<()>;

    /// Push buffered output to its destination
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn publish(&mut self, update: &FrameUpdate) -> Result<()> {
        (**self).publish(update)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Collects updates in memory
#[derive(Debug, Default)]
pub struct VecSink {
    pub updates: Vec<FrameUpdate>,
}

impl FrameSink for VecSink {
    fn publish(&mut self, update: &FrameUpdate) -> Result<()> {
        self.updates.push(update.clone());
        Ok(())
    }
}

/// Writes each update as one JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for JsonLinesSink<W> {
    fn publish(&mut self, update: &FrameUpdate) -> Result<()> {
        serde_json::to_writer(&mut self.writer, update).map_err(std::io::Error::from)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Packed record read by the shared-memory sender
///
/// Layout (16 bytes, no padding): `data[8]`, `can_id: u32 LE`,
/// `interval_ms: u16 LE` (0 means not cyclic), `cyclic: u8`, `immediate: u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShmRecord {
    pub data: [u8; 8],
    pub can_id: u32,
    pub interval_ms: u16,
    pub cyclic: bool,
    pub immediate: bool,
}

impl ShmRecord {
    /// Build a record from a composed frame; absent hints become zero
    ///
    /// `data` holds the big-endian payload bytes, zero-filled past `size`.
    pub fn from_update(update: &FrameUpdate) -> Self {
        let mut data = [0u8; 8];
        let payload = update.frame.payload();
        data[..payload.len()].copy_from_slice(&payload);

        let interval_ms = update
            .hints
            .interval_ms
            .map(|ms| u16::try_from(ms).unwrap_or(u16::MAX))
            .unwrap_or(0);

        Self {
            data,
            can_id: update.can_id,
            interval_ms,
            cyclic: update.hints.cyclic.unwrap_or(false),
            immediate: update.hints.immediate.unwrap_or(false),
        }
    }

    /// Serialize into the packed layout
    pub fn to_bytes(&self) -> [u8; SHM_RECORD_SIZE] {
        let mut bytes = [0u8; SHM_RECORD_SIZE];
        bytes[..8].copy_from_slice(&self.data);

        LittleEndian::write_u32(&mut bytes[8..12], self.can_id);
        LittleEndian::write_u16(&mut bytes[12..14], self.interval_ms);
        bytes[14] = u8::from(self.cyclic);
        bytes[15] = u8::from(self.immediate);

        bytes
    }
}

/// Writes packed shared-memory records back to back
pub struct RecordSink<W: Write> {
    writer: W,
}

impl<W: Write> RecordSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for RecordSink<W> {
    fn publish(&mut self, update: &FrameUpdate) -> Result<()> {
        let record = ShmRecord::from_update(update);
        self.writer.write_all(&record.to_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Frame, TransmitHints};

    fn update() -> FrameUpdate {
        let frame = Frame::from_bits(0x0102_0304_0506_0708, 8);
        FrameUpdate {
            message: "HS_Value_Limits".to_string(),
            can_id: 0x338,
            raw_frame: frame.to_hex(),
            hints: TransmitHints {
                interval_ms: Some(100),
                cyclic: Some(true),
                immediate: None,
            },
            frame,
        }
    }

    #[test]
    fn test_shm_record_layout() {
        let bytes = ShmRecord::from_update(&update()).to_bytes();
        assert_eq!(&bytes[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[8..12], &[0x38, 0x03, 0x00, 0x00]);
        assert_eq!(&bytes[12..14], &[100, 0]);
        assert_eq!(bytes[14], 1);
        assert_eq!(bytes[15], 0);
    }

    #[test]
    fn test_shm_record_saturates_interval() {
        let mut u = update();
        u.hints.interval_ms = Some(70_000);
        assert_eq!(ShmRecord::from_update(&u).interval_ms, u16::MAX);
    }

    #[test]
    fn test_short_frame_zero_fills_record() {
        // Only the top two bytes are sent
        let frame = Frame::from_bits(0xAABB_0000_0000_00CC, 2);
        let mut u = update();
        u.frame = frame;
        let record = ShmRecord::from_update(&u);
        assert_eq!(record.data, [0xAA, 0xBB, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.publish(&update()).unwrap();
        sink.publish(&update()).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["message"], "HS_Value_Limits");
        assert_eq!(parsed["raw_frame"], "0102030405060708");
        assert_eq!(parsed["interval_ms"], 100);
    }

    #[test]
    fn test_record_sink_writes_fixed_size_records() {
        let mut sink = RecordSink::new(Vec::new());
        sink.publish(&update()).unwrap();
        sink.publish(&update()).unwrap();
        assert_eq!(sink.into_inner().len(), 2 * SHM_RECORD_SIZE);
    }

    #[test]
    fn test_vec_sink_through_box() {
        let mut sink: Box<VecSink> = Box::default();
        sink.publish(&update()).unwrap();
        assert_eq!(sink.updates.len(), 1);
    }
}
