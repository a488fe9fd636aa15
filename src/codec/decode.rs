//! Engine -> Arrow.

use arrow::array::{
    ArrayBuilder, ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder,
    Float64Builder, Int16Builder, Int32Builder, Int64Builder, IntervalMonthDayNanoBuilder,
    StringBuilder, Time64MicrosecondBuilder, TimestampMicrosecondBuilder, UInt32Builder,
};
use arrow::error::ArrowError;
use std::sync::Arc;

use super::{decimal, temporal, Codec};
use crate::engine::wire::{self, fixed, WidthMismatch};
use crate::error::CellError;
use crate::types::mapping::UTC;

impl From<WidthMismatch> for CellError {
    fn from(e: WidthMismatch) -> Self {
        CellError::Malformed(e.to_string())
    }
}

/// Accumulates one result column. Built once per chunk from the column's
/// codec; `finish` yields the Arrow array and resets the builder.
#[derive(Debug)]
pub enum ColumnDecoder {
    SmallInt(Int16Builder),
    Int(Int32Builder),
    BigInt(Int64Builder),
    Oid(UInt32Builder),
    Double(Float64Builder),
    Bool(BooleanBuilder),
    Text(StringBuilder),
    Bytes(BinaryBuilder),
    Date(Date32Builder),
    Time(Time64MicrosecondBuilder),
    Timestamp(TimestampMicrosecondBuilder),
    Interval(IntervalMonthDayNanoBuilder),
    Numeric {
        builder: Decimal128Builder,
        precision: u8,
        scale: u8,
    },
}

impl ColumnDecoder {
    pub fn new(codec: Codec, capacity: usize) -> Result<Self, ArrowError> {
        Ok(match codec {
            Codec::SmallInt => Self::SmallInt(Int16Builder::with_capacity(capacity)),
            Codec::Int => Self::Int(Int32Builder::with_capacity(capacity)),
            Codec::BigInt => Self::BigInt(Int64Builder::with_capacity(capacity)),
            Codec::Oid => Self::Oid(UInt32Builder::with_capacity(capacity)),
            Codec::Double => Self::Double(Float64Builder::with_capacity(capacity)),
            Codec::Bool => Self::Bool(BooleanBuilder::with_capacity(capacity)),
            Codec::Text => Self::Text(StringBuilder::with_capacity(capacity, capacity * 8)),
            Codec::Bytes => Self::Bytes(BinaryBuilder::with_capacity(capacity, capacity * 8)),
            Codec::Date => Self::Date(Date32Builder::with_capacity(capacity)),
            Codec::Time => Self::Time(Time64MicrosecondBuilder::with_capacity(capacity)),
            Codec::Timestamp => {
                Self::Timestamp(TimestampMicrosecondBuilder::with_capacity(capacity))
            }
            Codec::TimestampTz => Self::Timestamp(
                TimestampMicrosecondBuilder::with_capacity(capacity)
                    .with_timezone(Arc::<str>::from(UTC)),
            ),
            Codec::Interval => Self::Interval(IntervalMonthDayNanoBuilder::with_capacity(capacity)),
            Codec::Numeric { precision, scale } => Self::Numeric {
                builder: Decimal128Builder::with_capacity(capacity)
                    .with_precision_and_scale(precision, scale as i8)?,
                precision,
                scale,
            },
        })
    }

    fn append_null(&mut self) {
        match self {
            Self::SmallInt(b) => b.append_null(),
            Self::Int(b) => b.append_null(),
            Self::BigInt(b) => b.append_null(),
            Self::Oid(b) => b.append_null(),
            Self::Double(b) => b.append_null(),
            Self::Bool(b) => b.append_null(),
            Self::Text(b) => b.append_null(),
            Self::Bytes(b) => b.append_null(),
            Self::Date(b) => b.append_null(),
            Self::Time(b) => b.append_null(),
            Self::Timestamp(b) => b.append_null(),
            Self::Interval(b) => b.append_null(),
            Self::Numeric { builder, .. } => builder.append_null(),
        }
    }

    /// Decode one cell. On error nothing is appended.
    pub fn decode(&mut self, cell: Option<&[u8]>) -> Result<(), CellError> {
        let Some(bytes) = cell else {
            self.append_null();
            return Ok(());
        };
        match self {
            Self::SmallInt(b) => b.append_value(i16::from_le_bytes(fixed(bytes)?)),
            Self::Int(b) => b.append_value(i32::from_le_bytes(fixed(bytes)?)),
            Self::BigInt(b) => b.append_value(i64::from_le_bytes(fixed(bytes)?)),
            Self::Oid(b) => b.append_value(u32::from_le_bytes(fixed(bytes)?)),
            Self::Double(b) => b.append_value(f64::from_le_bytes(fixed(bytes)?)),
            Self::Bool(b) => b.append_value(fixed::<1>(bytes)?[0] != 0),
            Self::Text(b) => b.append_value(
                std::str::from_utf8(bytes)
                    .map_err(|e| CellError::Malformed(format!("invalid UTF-8: {e}")))?,
            ),
            Self::Bytes(b) => b.append_value(bytes),
            Self::Date(b) => {
                b.append_value(temporal::julian_to_date32(u32::from_le_bytes(fixed(bytes)?))?)
            }
            Self::Time(b) => {
                let micros = i64::from_le_bytes(fixed(bytes)?);
                temporal::check_time_of_day(micros)?;
                b.append_value(micros)
            }
            Self::Timestamp(b) => {
                b.append_value(temporal::engine_to_timestamp(i64::from_le_bytes(fixed(bytes)?))?)
            }
            Self::Interval(b) => {
                b.append_value(temporal::interval_from_engine(wire::decode_interval(bytes)?)?)
            }
            Self::Numeric {
                builder,
                precision,
                scale,
            } => {
                let unscaled = wire::decode_numeric(bytes)?;
                builder.append_value(decimal::check_precision(unscaled, *precision, *scale)?)
            }
        }
        Ok(())
    }

    pub fn finish(&mut self) -> ArrayRef {
        match self {
            Self::SmallInt(b) => Arc::new(b.finish()),
            Self::Int(b) => Arc::new(b.finish()),
            Self::BigInt(b) => Arc::new(b.finish()),
            Self::Oid(b) => Arc::new(b.finish()),
            Self::Double(b) => Arc::new(b.finish()),
            Self::Bool(b) => Arc::new(b.finish()),
            Self::Text(b) => Arc::new(b.finish()),
            Self::Bytes(b) => Arc::new(b.finish()),
            Self::Date(b) => Arc::new(b.finish()),
            Self::Time(b) => Arc::new(b.finish()),
            Self::Timestamp(b) => Arc::new(b.finish()),
            Self::Interval(b) => Arc::new(b.finish()),
            Self::Numeric { builder, .. } => Arc::new(builder.finish()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::SmallInt(b) => b.len(),
            Self::Int(b) => b.len(),
            Self::BigInt(b) => b.len(),
            Self::Oid(b) => b.len(),
            Self::Double(b) => b.len(),
            Self::Bool(b) => b.len(),
            Self::Text(b) => b.len(),
            Self::Bytes(b) => b.len(),
            Self::Date(b) => b.len(),
            Self::Time(b) => b.len(),
            Self::Timestamp(b) => b.len(),
            Self::Interval(b) => b.len(),
            Self::Numeric { builder, .. } => builder.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, Decimal128Type, Int16Type, TimeUnit, TimestampMicrosecondType};

    #[test]
    fn nulls_and_values_land_in_order() -> anyhow::Result<()> {
        let mut dec = ColumnDecoder::new(Codec::SmallInt, 3)?;
        dec.decode(Some(&1i16.to_le_bytes()))?;
        dec.decode(None)?;
        dec.decode(Some(&3i16.to_le_bytes()))?;
        let array = dec.finish();
        let values = array.as_primitive::<Int16Type>();
        assert_eq!(values.value(0), 1);
        assert!(values.is_null(1));
        assert_eq!(values.value(2), 3);
        Ok(())
    }

    #[test]
    fn zoned_timestamps_come_back_as_utc() -> anyhow::Result<()> {
        let mut dec = ColumnDecoder::new(Codec::TimestampTz, 1)?;
        let raw = temporal::UNIX_EPOCH_JULIAN_MICROS + 5;
        dec.decode(Some(&raw.to_le_bytes()))?;
        let array = dec.finish();
        assert_eq!(
            array.data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
        assert_eq!(array.as_primitive::<TimestampMicrosecondType>().value(0), 5);
        Ok(())
    }

    #[test]
    fn numeric_width_follows_the_bytes() -> anyhow::Result<()> {
        let mut dec = ColumnDecoder::new(Codec::Numeric { precision: 38, scale: 38 }, 2)?;
        let v: i128 = -98_765_432_109_876_543_210_987_654_321_098_765_432;
        dec.decode(Some(&v.to_le_bytes()))?;
        dec.decode(Some(&7i64.to_le_bytes()))?;
        let array = dec.finish();
        let values = array.as_primitive::<Decimal128Type>();
        assert_eq!(values.value(0), v);
        assert_eq!(values.value(1), 7);
        assert_eq!(array.data_type(), &DataType::Decimal128(38, 38));
        Ok(())
    }

    #[test]
    fn malformed_cells_are_rejected_without_appending() -> anyhow::Result<()> {
        let mut dec = ColumnDecoder::new(Codec::Text, 1)?;
        assert!(matches!(
            dec.decode(Some(&[0xff, 0xfe])),
            Err(CellError::Malformed(_))
        ));
        assert!(dec.is_empty());

        let mut dec = ColumnDecoder::new(Codec::Int, 1)?;
        assert!(dec.decode(Some(&[1, 2])).is_err());
        Ok(())
    }
}
