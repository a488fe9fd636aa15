//! The two-way mapping between Arrow logical types and engine storage types.
//!
//! Write mapping (Arrow -> engine) is surjective onto the storage types this
//! crate creates; read mapping (engine -> Arrow) is total over everything but
//! GEOGRAPHY. Composing the two is the identity for every write-side target
//! except FLOAT, which widens to DOUBLE, and the narrow integer/time layouts,
//! which come back in their canonical width.

use arrow::array::timezone::Tz;
use arrow::datatypes::TimeUnit;
use std::sync::Arc;

use super::logical::{Layout, LogicalType};
use super::storage::{StorageType, MAX_NUMERIC_PRECISION};

/// Zone attached to TIMESTAMP_TZ columns read back from the engine.
pub const UTC: &str = "UTC";

/// Storage type for a column on the write path, or `None` when the Arrow
/// type has no counterpart.
///
/// Nullability is not part of the mapping. Every written column starts out
/// nullable and only `not_null_columns` tightens it; see
/// [`plan_write`](crate::plan::plan_write).
pub fn to_storage(logical: &LogicalType) -> Option<StorageType> {
    let st = match logical {
        LogicalType::Int8 | LogicalType::Int16 => StorageType::SmallInt,
        LogicalType::Int32 => StorageType::Int,
        LogicalType::Int64 => StorageType::BigInt,
        LogicalType::UInt32 => StorageType::Oid,
        LogicalType::Float32 | LogicalType::Float64 => StorageType::Double,
        LogicalType::Bool => StorageType::Bool,
        LogicalType::Utf8(_) => StorageType::Text,
        LogicalType::Binary(_) | LogicalType::FixedSizeBinary(_) => StorageType::Bytes,
        LogicalType::Date32 => StorageType::Date,
        LogicalType::Time(_) => StorageType::Time,
        LogicalType::Timestamp(_, None) => StorageType::Timestamp,
        LogicalType::Timestamp(_, Some(tz)) => {
            // An unparseable zone would only fail later, mid-batch.
            if tz.parse::<Tz>().is_err() {
                return None;
            }
            StorageType::TimestampTz
        }
        LogicalType::IntervalMonthDayNano => StorageType::Interval,
        LogicalType::Decimal128 { precision, scale } => {
            if *precision == 0 || *precision > MAX_NUMERIC_PRECISION {
                return None;
            }
            let scale = u8::try_from(*scale).ok()?;
            if scale > *precision {
                return None;
            }
            StorageType::Numeric {
                precision: *precision,
                scale,
            }
        }
        LogicalType::Unsupported(_) => return None,
    };
    Some(st)
}

/// Arrow type for a column on the read path, or `None` for storage types
/// that cannot be read (GEOGRAPHY).
///
/// The Arrow field's nullability is copied from the column definition by
/// [`plan_read`](crate::plan::plan_read), not decided here.
pub fn to_logical(storage: &StorageType) -> Option<LogicalType> {
    let lt = match storage {
        StorageType::SmallInt => LogicalType::Int16,
        StorageType::Int => LogicalType::Int32,
        StorageType::BigInt => LogicalType::Int64,
        StorageType::Oid => LogicalType::UInt32,
        StorageType::Double => LogicalType::Float64,
        StorageType::Bool => LogicalType::Bool,
        StorageType::Text | StorageType::Varchar(_) | StorageType::Char(_) | StorageType::Json => {
            LogicalType::Utf8(Layout::Small)
        }
        StorageType::Bytes => LogicalType::Binary(Layout::Small),
        StorageType::Date => LogicalType::Date32,
        StorageType::Time => LogicalType::Time(TimeUnit::Microsecond),
        StorageType::Timestamp => LogicalType::Timestamp(TimeUnit::Microsecond, None),
        StorageType::TimestampTz => {
            LogicalType::Timestamp(TimeUnit::Microsecond, Some(Arc::from(UTC)))
        }
        StorageType::Interval => LogicalType::IntervalMonthDayNano,
        StorageType::Numeric { precision, scale } => LogicalType::Decimal128 {
            precision: *precision,
            scale: *scale as i8,
        },
        StorageType::Geography => return None,
    };
    Some(lt)
}
