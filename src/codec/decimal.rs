use crate::engine::wire::numeric_fits;
use crate::error::CellError;

/// Render an unscaled value with `scale` fractional digits, for messages.
pub fn format_unscaled(unscaled: i128, scale: u8) -> String {
    let digits = unscaled.unsigned_abs().to_string();
    let sign = if unscaled < 0 { "-" } else { "" };
    let scale = usize::from(scale);
    if scale == 0 {
        return format!("{sign}{digits}");
    }
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (int, frac) = padded.split_at(padded.len() - scale);
    format!("{sign}{int}.{frac}")
}

/// Arrow does not enforce a Decimal128 column's declared precision on its
/// values; the engine does, so check before handing the value over.
pub fn check_precision(unscaled: i128, precision: u8, scale: u8) -> Result<i128, CellError> {
    if numeric_fits(unscaled, precision) {
        Ok(unscaled)
    } else {
        Err(CellError::OutOfRange(format!(
            "{} exceeds precision {precision}",
            format_unscaled(unscaled, scale)
        )))
    }
}
