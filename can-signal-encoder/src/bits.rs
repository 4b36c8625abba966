//! Bit-field packing
//!
//! Places a raw integer into its field of a 64-bit frame and reports the
//! `(mask, value_bits)` pair the composer merges with
//! `(frame & !mask) | (value_bits & mask)`.
//!
//! The frame value is sent big-endian: payload byte `k` holds bits
//! `(7-k)*8..=(7-k)*8+7`, so byte 0 carries the most significant byte.
//!
//! Start bits are numbered per byte order:
//! - intel: bit `n` of the 64-bit frame value, counted from its LSB
//! - intel (payload): DBC numbering, bit `n % 8` of payload byte `n / 8`
//! - motorola: DBC numbering, walking from the MSB toward later bytes

use crate::signals::database::{ByteOrder, ValueType};
use crate::types::{BitField, EncoderError, Result};

/// Width of the frame space in bits
pub const FRAME_BITS: u16 = 64;

/// Bytes in a classic CAN payload
const FRAME_BYTES: u16 = 8;

/// Frame bit holding DBC bit `n` (bit `n % 8` of payload byte `n / 8`)
fn frame_bit(dbc_bit: u16) -> u16 {
    (FRAME_BYTES - 1 - dbc_bit / 8) * 8 + dbc_bit % 8
}

/// Pack a raw value into a bit field
///
/// The raw value is first limited to the field's range (clamped, not
/// rejected) and converted to its `bit_length`-wide two's-complement form.
///
/// # Arguments
/// * `raw` - Raw integer (may be negative for signed fields)
/// * `start_bit` - LSB position for intel, MSB position for motorola
/// * `bit_length` - Field width, 1..=64
/// * `byte_order` - Placement convention
/// * `value_type` - Signedness of the field
///
/// # Returns
/// * `BitField` with `mask` covering exactly the field's bits
/// * `BitRangeError` if the length is out of range or the field leaves the frame
pub fn pack_bits(
    raw: i128,
    start_bit: u16,
    bit_length: u16,
    byte_order: ByteOrder,
    value_type: ValueType,
) -> Result<BitField> {
    field_extent(start_bit, bit_length, byte_order)?;

    let unsigned = to_twos_complement(clamp_raw(raw, bit_length, value_type), bit_length);

    let field = match byte_order {
        ByteOrder::LittleEndian => place_intel(unsigned, start_bit, bit_length),
        ByteOrder::LittleEndianPayload => place_intel_payload(unsigned, start_bit, bit_length),
        ByteOrder::BigEndian => place_motorola(unsigned, start_bit, bit_length),
    };

    Ok(field)
}

/// Number of payload bytes a field reaches (index of its last byte + 1)
///
/// A message of `size` bytes sends the top `size` bytes of the frame, so a
/// field fits when this is at most `size`.
///
/// Fails with `BitRangeError` when the length is outside 1..=64 or the field
/// does not fit in the 64-bit frame.
pub fn field_extent(start_bit: u16, bit_length: u16, byte_order: ByteOrder) -> Result<usize> {
    if bit_length == 0 || bit_length > FRAME_BITS {
        return Err(EncoderError::BitRangeError(format!(
            "bit length {} outside 1..=64",
            bit_length
        )));
    }
    if start_bit >= FRAME_BITS {
        return Err(EncoderError::BitRangeError(format!(
            "start bit {} outside 0..=63",
            start_bit
        )));
    }

    match byte_order {
        ByteOrder::LittleEndian | ByteOrder::LittleEndianPayload => {
            let end = start_bit + bit_length;
            if end > FRAME_BITS {
                return Err(EncoderError::BitRangeError(format!(
                    "intel field {}|{} ends at bit {}, beyond the 64-bit frame",
                    start_bit,
                    bit_length,
                    end - 1
                )));
            }
            if byte_order == ByteOrder::LittleEndian {
                // The LSB sits in the latest payload byte the field touches
                Ok((FRAME_BYTES - start_bit / 8) as usize)
            } else {
                Ok(((end - 1) / 8 + 1) as usize)
            }
        }
        ByteOrder::BigEndian => {
            // Bits available from the start bit down to bit 0 of its byte
            let first_byte_bits = start_bit % 8 + 1;
            let last_byte = if bit_length <= first_byte_bits {
                start_bit / 8
            } else {
                start_bit / 8 + (bit_length - first_byte_bits + 7) / 8
            };
            if last_byte >= FRAME_BYTES {
                return Err(EncoderError::BitRangeError(format!(
                    "motorola field {}|{} runs past byte 7",
                    start_bit, bit_length
                )));
            }
            Ok((last_byte + 1) as usize)
        }
    }
}

/// Limit a raw value to the range the field can hold
///
/// Signed: `[-(2^(n-1)), 2^(n-1) - 1]`, unsigned: `[0, 2^n - 1]`.
pub fn clamp_raw(raw: i128, bit_length: u16, value_type: ValueType) -> i128 {
    let (min, max) = raw_bounds(bit_length, value_type);
    raw.clamp(min, max)
}

/// Inclusive raw range of a field
pub fn raw_bounds(bit_length: u16, value_type: ValueType) -> (i128, i128) {
    let width = u32::from(bit_length);
    match value_type {
        ValueType::Unsigned => (0, (1i128 << width) - 1),
        ValueType::Signed => (-(1i128 << (width - 1)), (1i128 << (width - 1)) - 1),
    }
}

/// `bit_length`-wide two's-complement representation of a value
///
/// The value must already be inside the field's range.
pub fn to_twos_complement(value: i128, bit_length: u16) -> u64 {
    // Truncating to 64 bits keeps the two's-complement pattern; the mask trims
    // it to the field width.
    (value as u64) & low_mask(bit_length)
}

/// Mask with the lowest `width` bits set
fn low_mask(width: u16) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Intel: contiguous bits counted upward from the start bit
fn place_intel(value: u64, start_bit: u16, bit_length: u16) -> BitField {
    BitField {
        mask: low_mask(bit_length) << start_bit,
        value_bits: value << start_bit,
    }
}

/// Intel in DBC numbering: contiguous in payload-byte order, which is the
/// byte-swapped image of the frame value
fn place_intel_payload(value: u64, start_bit: u16, bit_length: u16) -> BitField {
    let field = place_intel(value, start_bit, bit_length);
    BitField {
        mask: field.mask.swap_bytes(),
        value_bits: field.value_bits.swap_bytes(),
    }
}

/// Motorola: most significant bits first, walking down each byte and
/// continuing at bit 7 of the next payload byte
///
/// The next payload byte is the next lower byte of the frame value, so the
/// walk simply continues one bit below the last segment.
fn place_motorola(value: u64, start_bit: u16, bit_length: u16) -> BitField {
    let mut field = BitField::default();
    let mut remaining = bit_length;
    let mut msb_pos = frame_bit(start_bit);

    while remaining > 0 {
        let bits_in_this_byte = remaining.min(msb_pos % 8 + 1);
        let lsb_pos = msb_pos + 1 - bits_in_this_byte;
        remaining -= bits_in_this_byte;

        // Top bits of what is left of the value
        let segment = (value >> remaining) & low_mask(bits_in_this_byte);
        field.mask |= low_mask(bits_in_this_byte) << lsb_pos;
        field.value_bits |= segment << lsb_pos;

        msb_pos = lsb_pos.saturating_sub(1);
    }

    field
}
