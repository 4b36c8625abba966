//! Physical to raw value conversion
//!
//! Inverts the linear signal scaling `physical = raw * factor + offset`.
//! Rounding is half away from zero (`f64::round`) everywhere in the crate.

use crate::types::{EncoderError, Result};

/// Clamp a value to optional bounds
///
/// NaN passes through unchanged so the caller can report it.
pub fn clamp(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    match (min, max) {
        (Some(min), _) if value < min => min,
        (_, Some(max)) if value > max => max,
        _ => value,
    }
}

/// Convert a physical value into the signal's raw integer
///
/// The value is clamped to `[min, max]` first, then
/// `raw = round((clamped - offset) / factor)`.
///
/// The result is an `i128` so that every signed and unsigned 64-bit raw value
/// is representable; range limiting to the field width happens in the packer.
pub fn physical_to_raw(
    physical: f64,
    factor: f64,
    offset: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<i128> {
    if factor == 0.0 {
        return Err(EncoderError::InvalidConfig(
            "factor must not be zero".to_string(),
        ));
    }
    if !factor.is_finite() || !offset.is_finite() {
        return Err(EncoderError::InvalidConfig(format!(
            "factor and offset must be finite (factor {}, offset {})",
            factor, offset
        )));
    }

    let clamped = clamp(physical, min, max);
    let raw = ((clamped - offset) / factor).round();
    if !raw.is_finite() {
        return Err(EncoderError::NonFiniteResult(format!(
            "physical value {} gives raw {}",
            physical, raw
        )));
    }

    // Saturates beyond the i128 range; the packer clamps to the field anyway.
    Ok(raw as i128)
}
