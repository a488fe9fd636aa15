//! Arrow -> engine.

use arrow::array::timezone::Tz;
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BinaryViewArray, BooleanArray, FixedSizeBinaryArray,
    LargeBinaryArray, LargeStringArray, StringArray, StringViewArray,
};
use arrow::datatypes::{
    DataType, Date32Type, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, IntervalMonthDayNano, IntervalMonthDayNanoType, Time32MillisecondType,
    Time32SecondType, Time64MicrosecondType, Time64NanosecondType, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt32Type,
};
use arrow::error::ArrowError;

use super::{decimal, temporal, Codec};
use crate::engine::Appender;
use crate::error::CellError;
use crate::plan::ColumnPlan;

/// Typed view of the source values of one column.
enum Source<'a> {
    Int8(&'a [i8]),
    Int16(&'a [i16]),
    Int32(&'a [i32]),
    Int64(&'a [i64]),
    UInt32(&'a [u32]),
    Float32(&'a [f32]),
    Float64(&'a [f64]),
    Bool(&'a BooleanArray),
    Utf8(&'a StringArray),
    LargeUtf8(&'a LargeStringArray),
    Utf8View(&'a StringViewArray),
    Binary(&'a BinaryArray),
    LargeBinary(&'a LargeBinaryArray),
    BinaryView(&'a BinaryViewArray),
    FixedSizeBinary(&'a FixedSizeBinaryArray),
    Date32(&'a [i32]),
    Time32 { values: &'a [i32], unit: TimeUnit },
    Time64 { values: &'a [i64], unit: TimeUnit },
    Timestamp { values: &'a [i64], unit: TimeUnit },
    TimestampTz { values: &'a [i64], unit: TimeUnit, tz: Tz },
    Interval(&'a [IntervalMonthDayNano]),
    Decimal { values: &'a [i128], precision: u8, scale: u8 },
}

/// One column of one batch, bound to its plan.
pub struct ColumnEncoder<'a> {
    array: &'a dyn Array,
    nullable: bool,
    source: Source<'a>,
}

fn mismatch(plan: &ColumnPlan, array: &dyn Array) -> ArrowError {
    ArrowError::SchemaError(format!(
        "column '{}' planned as {} but batch holds {}",
        plan.name,
        plan.logical_type,
        array.data_type()
    ))
}

fn timestamp_values(array: &dyn Array, unit: TimeUnit) -> Option<&[i64]> {
    let values: &[i64] = match unit {
        TimeUnit::Second => array.as_primitive_opt::<TimestampSecondType>()?.values(),
        TimeUnit::Millisecond => array.as_primitive_opt::<TimestampMillisecondType>()?.values(),
        TimeUnit::Microsecond => array.as_primitive_opt::<TimestampMicrosecondType>()?.values(),
        TimeUnit::Nanosecond => array.as_primitive_opt::<TimestampNanosecondType>()?.values(),
    };
    Some(values)
}

impl<'a> ColumnEncoder<'a> {
    /// Bind `array` to `plan`. Fails if the array is not of the planned type.
    pub fn bind(plan: &ColumnPlan, array: &'a ArrayRef) -> Result<Self, ArrowError> {
        let array: &'a dyn Array = array.as_ref();
        let source = Self::source(plan, array).ok_or_else(|| mismatch(plan, array))?;
        Ok(Self {
            array,
            nullable: plan.nullable,
            source,
        })
    }

    fn source(plan: &ColumnPlan, array: &'a dyn Array) -> Option<Source<'a>> {
        let dt = array.data_type();
        if *dt != plan.logical_type.to_arrow() {
            return None;
        }
        let source = match (plan.codec, dt) {
            (Codec::SmallInt, DataType::Int8) => {
                Source::Int8(array.as_primitive_opt::<Int8Type>()?.values())
            }
            (Codec::SmallInt, DataType::Int16) => {
                Source::Int16(array.as_primitive_opt::<Int16Type>()?.values())
            }
            (Codec::Int, DataType::Int32) => {
                Source::Int32(array.as_primitive_opt::<Int32Type>()?.values())
            }
            (Codec::BigInt, DataType::Int64) => {
                Source::Int64(array.as_primitive_opt::<Int64Type>()?.values())
            }
            (Codec::Oid, DataType::UInt32) => {
                Source::UInt32(array.as_primitive_opt::<UInt32Type>()?.values())
            }
            (Codec::Double, DataType::Float32) => {
                Source::Float32(array.as_primitive_opt::<Float32Type>()?.values())
            }
            (Codec::Double, DataType::Float64) => {
                Source::Float64(array.as_primitive_opt::<Float64Type>()?.values())
            }
            (Codec::Bool, DataType::Boolean) => Source::Bool(array.as_boolean_opt()?),
            (Codec::Text, DataType::Utf8) => Source::Utf8(array.as_string_opt::<i32>()?),
            (Codec::Text, DataType::LargeUtf8) => Source::LargeUtf8(array.as_string_opt::<i64>()?),
            (Codec::Text, DataType::Utf8View) => Source::Utf8View(array.as_string_view_opt()?),
            (Codec::Bytes, DataType::Binary) => Source::Binary(array.as_binary_opt::<i32>()?),
            (Codec::Bytes, DataType::LargeBinary) => {
                Source::LargeBinary(array.as_binary_opt::<i64>()?)
            }
            (Codec::Bytes, DataType::BinaryView) => Source::BinaryView(array.as_binary_view_opt()?),
            (Codec::Bytes, DataType::FixedSizeBinary(_)) => {
                Source::FixedSizeBinary(array.as_fixed_size_binary_opt()?)
            }
            (Codec::Date, DataType::Date32) => {
                Source::Date32(array.as_primitive_opt::<Date32Type>()?.values())
            }
            (Codec::Time, DataType::Time32(TimeUnit::Second)) => Source::Time32 {
                values: array.as_primitive_opt::<Time32SecondType>()?.values(),
                unit: TimeUnit::Second,
            },
            (Codec::Time, DataType::Time32(TimeUnit::Millisecond)) => Source::Time32 {
                values: array.as_primitive_opt::<Time32MillisecondType>()?.values(),
                unit: TimeUnit::Millisecond,
            },
            (Codec::Time, DataType::Time64(TimeUnit::Microsecond)) => Source::Time64 {
                values: array.as_primitive_opt::<Time64MicrosecondType>()?.values(),
                unit: TimeUnit::Microsecond,
            },
            (Codec::Time, DataType::Time64(TimeUnit::Nanosecond)) => Source::Time64 {
                values: array.as_primitive_opt::<Time64NanosecondType>()?.values(),
                unit: TimeUnit::Nanosecond,
            },
            (Codec::Timestamp, DataType::Timestamp(unit, None)) => Source::Timestamp {
                values: timestamp_values(array, *unit)?,
                unit: *unit,
            },
            (Codec::TimestampTz, DataType::Timestamp(unit, Some(tz))) => Source::TimestampTz {
                values: timestamp_values(array, *unit)?,
                unit: *unit,
                tz: tz.parse().ok()?,
            },
            (Codec::Interval, DataType::Interval(_)) => {
                Source::Interval(array.as_primitive_opt::<IntervalMonthDayNanoType>()?.values())
            }
            (Codec::Numeric { precision, scale }, DataType::Decimal128(..)) => Source::Decimal {
                values: array.as_primitive_opt::<Decimal128Type>()?.values(),
                precision,
                scale,
            },
            _ => return None,
        };
        Some(source)
    }

    /// Append the cell at `row` as the next value of the current engine row.
    pub fn append(&self, row: usize, appender: &mut dyn Appender) -> Result<(), CellError> {
        if self.array.is_null(row) {
            if !self.nullable {
                return Err(CellError::NullInNotNullColumn);
            }
            return Ok(appender.add_null()?);
        }
        match &self.source {
            Source::Int8(v) => appender.add_i16(i16::from(v[row]))?,
            Source::Int16(v) => appender.add_i16(v[row])?,
            Source::Int32(v) => appender.add_i32(v[row])?,
            Source::Int64(v) => appender.add_i64(v[row])?,
            Source::UInt32(v) => appender.add_u32(v[row])?,
            Source::Float32(v) => appender.add_f64(f64::from(v[row]))?,
            Source::Float64(v) => appender.add_f64(v[row])?,
            Source::Bool(a) => appender.add_bool(a.value(row))?,
            Source::Utf8(a) => appender.add_text(a.value(row))?,
            Source::LargeUtf8(a) => appender.add_text(a.value(row))?,
            // Views resolve to contiguous bytes whether inlined or not.
            Source::Utf8View(a) => appender.add_text(a.value(row))?,
            Source::Binary(a) => appender.add_bytes(a.value(row))?,
            Source::LargeBinary(a) => appender.add_bytes(a.value(row))?,
            Source::BinaryView(a) => appender.add_bytes(a.value(row))?,
            Source::FixedSizeBinary(a) => appender.add_bytes(a.value(row))?,
            Source::Date32(v) => appender.add_date(temporal::date32_to_julian(v[row])?)?,
            Source::Time32 { values, unit } => {
                appender.add_time(temporal::time_to_micros(i64::from(values[row]), *unit)?)?
            }
            Source::Time64 { values, unit } => {
                appender.add_time(temporal::time_to_micros(values[row], *unit)?)?
            }
            Source::Timestamp { values, unit } => {
                appender.add_timestamp(temporal::timestamp_to_engine(values[row], *unit)?)?
            }
            Source::TimestampTz { values, unit, tz } => appender.add_timestamp(
                temporal::zoned_timestamp_to_engine(values[row], *unit, tz)?,
            )?,
            Source::Interval(v) => appender.add_interval(temporal::interval_to_engine(v[row])?)?,
            Source::Decimal {
                values,
                precision,
                scale,
            } => appender.add_numeric(decimal::check_precision(values[row], *precision, *scale)?)?,
        }
        Ok(())
    }
}
