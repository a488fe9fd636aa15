//! Calendar arithmetic between Arrow's Unix-epoch values and the engine's
//! Julian-epoch values. All conversions are checked; nothing wraps.

use arrow::array::timezone::Tz;
use arrow::datatypes::{IntervalMonthDayNano, TimeUnit};
use chrono::{TimeZone, Utc};

use crate::engine::Interval;
use crate::error::CellError;

/// Julian day number of 1970-01-01.
pub const UNIX_EPOCH_JULIAN_DAY: i64 = 2_440_588;
pub const MICROS_PER_DAY: i64 = 86_400_000_000;
/// Microseconds between the Julian epoch and the Unix epoch.
pub const UNIX_EPOCH_JULIAN_MICROS: i64 = UNIX_EPOCH_JULIAN_DAY * MICROS_PER_DAY;

fn out_of_range(what: impl Into<String>) -> CellError {
    CellError::OutOfRange(what.into())
}

pub fn date32_to_julian(days: i32) -> Result<u32, CellError> {
    let julian = i64::from(days) + UNIX_EPOCH_JULIAN_DAY;
    u32::try_from(julian).map_err(|_| {
        out_of_range(format!(
            "date {days} days from epoch precedes the Julian epoch"
        ))
    })
}

pub fn julian_to_date32(julian: u32) -> Result<i32, CellError> {
    let days = i64::from(julian) - UNIX_EPOCH_JULIAN_DAY;
    i32::try_from(days)
        .map_err(|_| out_of_range(format!("Julian day {julian} does not fit a Date32")))
}

/// Scale a value in `unit` to microseconds, flooring sub-microsecond parts.
pub fn to_micros(value: i64, unit: TimeUnit) -> Result<i64, CellError> {
    let scaled = match unit {
        TimeUnit::Second => value.checked_mul(1_000_000),
        TimeUnit::Millisecond => value.checked_mul(1_000),
        TimeUnit::Microsecond => Some(value),
        TimeUnit::Nanosecond => Some(value.div_euclid(1_000)),
    };
    scaled.ok_or_else(|| out_of_range(format!("{value} {unit:?}s overflows microseconds")))
}

/// Time of day in `unit` to microseconds since midnight.
pub fn time_to_micros(value: i64, unit: TimeUnit) -> Result<i64, CellError> {
    let micros = to_micros(value, unit)?;
    check_time_of_day(micros)?;
    Ok(micros)
}

pub fn check_time_of_day(micros: i64) -> Result<(), CellError> {
    if !(0..MICROS_PER_DAY).contains(&micros) {
        return Err(out_of_range(format!("{micros}us is not a time of day")));
    }
    Ok(())
}

/// Naive timestamp in `unit` to engine microseconds.
pub fn timestamp_to_engine(value: i64, unit: TimeUnit) -> Result<i64, CellError> {
    to_micros(value, unit)?
        .checked_add(UNIX_EPOCH_JULIAN_MICROS)
        .ok_or_else(|| out_of_range(format!("timestamp {value} overflows")))
}

/// Zoned timestamp in `unit` to engine microseconds, normalized to UTC.
///
/// Arrow stores zoned values as UTC instants already; resolving through the
/// zone catches instants chrono cannot represent.
pub fn zoned_timestamp_to_engine(value: i64, unit: TimeUnit, tz: &Tz) -> Result<i64, CellError> {
    let micros = to_micros(value, unit)?;
    let instant = tz
        .timestamp_micros(micros)
        .single()
        .ok_or_else(|| out_of_range(format!("timestamp {value} is outside the supported range")))?;
    instant
        .with_timezone(&Utc)
        .timestamp_micros()
        .checked_add(UNIX_EPOCH_JULIAN_MICROS)
        .ok_or_else(|| out_of_range(format!("timestamp {value} overflows")))
}

/// Engine microseconds back to Unix-epoch microseconds.
pub fn engine_to_timestamp(micros: i64) -> Result<i64, CellError> {
    micros
        .checked_sub(UNIX_EPOCH_JULIAN_MICROS)
        .ok_or_else(|| out_of_range(format!("timestamp {micros} overflows")))
}

/// Arrow interval to the engine's form. Calendar months cannot be stored;
/// nanoseconds are truncated to microseconds.
pub fn interval_to_engine(value: IntervalMonthDayNano) -> Result<Interval, CellError> {
    if value.months != 0 {
        return Err(CellError::Malformed(format!(
            "interval has {} calendar months; only day and time components can be stored",
            value.months
        )));
    }
    Ok(Interval {
        months: 0,
        days: value.days,
        micros: value.nanoseconds / 1_000,
    })
}

pub fn interval_from_engine(value: Interval) -> Result<IntervalMonthDayNano, CellError> {
    if value.months != 0 {
        return Err(CellError::MonthComponent(value.months));
    }
    let nanos = value
        .micros
        .checked_mul(1_000)
        .ok_or_else(|| {
            out_of_range(format!(
                "interval of {}us overflows nanoseconds",
                value.micros
            ))
        })?;
    Ok(IntervalMonthDayNano::new(0, value.days, nanos))
}
