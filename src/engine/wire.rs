//! Byte layout of single cells as the engine stores and returns them.
//!
//! All integers are little-endian. DATE is a u32 Julian day, TIME an i64 of
//! microseconds since midnight, TIMESTAMP[_TZ] an i64 of microseconds since
//! the Julian epoch. INTERVAL is 16 bytes: microseconds (i64), days (i32),
//! months (i32). NUMERIC is the unscaled value as i64 for precision <= 18
//! and i128 above.

use super::Interval;
use crate::types::storage::{MAX_NUMERIC_PRECISION, SMALL_NUMERIC_PRECISION};

pub const INTERVAL_WIDTH: usize = 16;

/// Cell bytes did not have the width the column type requires.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} bytes, got {actual}")]
pub struct WidthMismatch {
    pub expected: usize,
    pub actual: usize,
}

pub fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], WidthMismatch> {
    bytes.try_into().map_err(|_| WidthMismatch {
        expected: N,
        actual: bytes.len(),
    })
}

pub fn encode_interval(value: Interval) -> [u8; INTERVAL_WIDTH] {
    let mut out = [0u8; INTERVAL_WIDTH];
    out[0..8].copy_from_slice(&value.micros.to_le_bytes());
    out[8..12].copy_from_slice(&value.days.to_le_bytes());
    out[12..16].copy_from_slice(&value.months.to_le_bytes());
    out
}

pub fn decode_interval(bytes: &[u8]) -> Result<Interval, WidthMismatch> {
    let raw: [u8; INTERVAL_WIDTH] = fixed(bytes)?;
    let mut micros = [0u8; 8];
    let mut days = [0u8; 4];
    let mut months = [0u8; 4];
    micros.copy_from_slice(&raw[0..8]);
    days.copy_from_slice(&raw[8..12]);
    months.copy_from_slice(&raw[12..16]);
    Ok(Interval {
        micros: i64::from_le_bytes(micros),
        days: i32::from_le_bytes(days),
        months: i32::from_le_bytes(months),
    })
}

/// Whether an unscaled value has at most `precision` decimal digits.
pub fn numeric_fits(unscaled: i128, precision: u8) -> bool {
    if precision == 0 || precision > MAX_NUMERIC_PRECISION {
        return false;
    }
    let bound = 10i128.pow(u32::from(precision));
    unscaled > -bound && unscaled < bound
}

/// Encode an unscaled NUMERIC. Returns `None` when the value does not fit
/// the 8-byte form chosen for small precisions.
pub fn encode_numeric(unscaled: i128, precision: u8) -> Option<Vec<u8>> {
    if precision <= SMALL_NUMERIC_PRECISION {
        let narrow = i64::try_from(unscaled).ok()?;
        Some(narrow.to_le_bytes().to_vec())
    } else {
        Some(unscaled.to_le_bytes().to_vec())
    }
}

/// Decode an unscaled NUMERIC of either width.
pub fn decode_numeric(bytes: &[u8]) -> Result<i128, WidthMismatch> {
    match bytes.len() {
        8 => Ok(i128::from(i64::from_le_bytes(fixed(bytes)?))),
        16 => Ok(i128::from_le_bytes(fixed(bytes)?)),
        actual => Err(WidthMismatch {
            expected: 16,
            actual,
        }),
    }
}
