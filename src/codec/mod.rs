//! Per-cell conversion between Arrow arrays and engine wire values.
//!
//! Each column gets a [`Codec`] once, at plan time; every batch then binds
//! its arrays to encoders (write) or builders (read) exactly once, and the
//! per-row loop is a plain `match` with no further type inspection.

pub mod decimal;
pub mod decode;
pub mod encode;
pub mod temporal;

pub use decode::ColumnDecoder;
pub use encode::ColumnEncoder;

use crate::types::StorageType;

/// How a column's cells travel over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    SmallInt,
    Int,
    BigInt,
    Oid,
    Double,
    Bool,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Numeric { precision: u8, scale: u8 },
}

impl Codec {
    pub fn for_storage(storage: &StorageType) -> Codec {
        match storage {
            StorageType::SmallInt => Codec::SmallInt,
            StorageType::Int => Codec::Int,
            StorageType::BigInt => Codec::BigInt,
            StorageType::Oid => Codec::Oid,
            StorageType::Double => Codec::Double,
            StorageType::Bool => Codec::Bool,
            StorageType::Text
            | StorageType::Varchar(_)
            | StorageType::Char(_)
            | StorageType::Json => Codec::Text,
            StorageType::Bytes | StorageType::Geography => Codec::Bytes,
            StorageType::Date => Codec::Date,
            StorageType::Time => Codec::Time,
            StorageType::Timestamp => Codec::Timestamp,
            StorageType::TimestampTz => Codec::TimestampTz,
            StorageType::Interval => Codec::Interval,
            StorageType::Numeric { precision, scale } => Codec::Numeric {
                precision: *precision,
                scale: *scale,
            },
        }
    }
}
