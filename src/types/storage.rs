use serde::{Deserialize, Serialize};
use std::fmt;

/// The engine's column types.
///
/// Serialized into the database catalog, so variant names are part of the
/// on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    SmallInt,
    Int,
    BigInt,
    Double,
    Bool,
    Text,
    /// Only ever produced by tables created outside this crate.
    Varchar(u32),
    Char(u32),
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Numeric { precision: u8, scale: u8 },
    Oid,
    Json,
    Geography,
}

/// Largest precision a NUMERIC column can carry.
pub const MAX_NUMERIC_PRECISION: u8 = 38;

/// NUMERIC columns up to this precision travel as 8-byte integers.
pub const SMALL_NUMERIC_PRECISION: u8 = 18;

impl StorageType {
    /// Byte width of a non-null cell, or `None` for variable-width types.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            StorageType::SmallInt => Some(2),
            StorageType::Int | StorageType::Oid | StorageType::Date => Some(4),
            StorageType::BigInt
            | StorageType::Double
            | StorageType::Time
            | StorageType::Timestamp
            | StorageType::TimestampTz => Some(8),
            StorageType::Bool => Some(1),
            StorageType::Interval => Some(16),
            StorageType::Numeric { precision, .. } => {
                if *precision <= SMALL_NUMERIC_PRECISION {
                    Some(8)
                } else {
                    Some(16)
                }
            }
            StorageType::Text
            | StorageType::Varchar(_)
            | StorageType::Char(_)
            | StorageType::Bytes
            | StorageType::Json
            | StorageType::Geography => None,
        }
    }

    /// Types whose cells are UTF-8 text on the wire.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            StorageType::Text | StorageType::Varchar(_) | StorageType::Char(_) | StorageType::Json
        )
    }

    /// Whether a column planned as `self` may be appended to an existing
    /// column of type `existing`.
    ///
    /// VARCHAR/CHAR are never produced on write, but text may still be
    /// appended into such columns of externally created tables.
    pub fn is_compatible_with(&self, existing: &StorageType) -> bool {
        if self == existing {
            return true;
        }
        matches!(
            (self, existing),
            (StorageType::Text, StorageType::Varchar(_)) | (StorageType::Text, StorageType::Char(_))
        )
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::SmallInt => f.write_str("SMALLINT"),
            StorageType::Int => f.write_str("INT"),
            StorageType::BigInt => f.write_str("BIGINT"),
            StorageType::Double => f.write_str("DOUBLE"),
            StorageType::Bool => f.write_str("BOOL"),
            StorageType::Text => f.write_str("TEXT"),
            StorageType::Varchar(n) => write!(f, "VARCHAR({n})"),
            StorageType::Char(n) => write!(f, "CHAR({n})"),
            StorageType::Bytes => f.write_str("BYTES"),
            StorageType::Date => f.write_str("DATE"),
            StorageType::Time => f.write_str("TIME"),
            StorageType::Timestamp => f.write_str("TIMESTAMP"),
            StorageType::TimestampTz => f.write_str("TIMESTAMP_TZ"),
            StorageType::Interval => f.write_str("INTERVAL"),
            StorageType::Numeric { precision, scale } => write!(f, "NUMERIC({precision},{scale})"),
            StorageType::Oid => f.write_str("OID"),
            StorageType::Json => f.write_str("JSON"),
            StorageType::Geography => f.write_str("GEOGRAPHY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_width_follows_precision() {
        let narrow = StorageType::Numeric { precision: 18, scale: 2 };
        let wide = StorageType::Numeric { precision: 19, scale: 2 };
        assert_eq!(narrow.fixed_width(), Some(8));
        assert_eq!(wide.fixed_width(), Some(16));
    }

    #[test]
    fn text_appends_into_varchar_but_not_the_reverse() {
        assert!(StorageType::Text.is_compatible_with(&StorageType::Varchar(42)));
        assert!(!StorageType::Varchar(42).is_compatible_with(&StorageType::Text));
        assert!(!StorageType::SmallInt.is_compatible_with(&StorageType::BigInt));
    }

    #[test]
    fn catalog_serialization_is_stable() -> anyhow::Result<()> {
        let json = serde_json::to_string(&StorageType::Numeric { precision: 5, scale: 2 })?;
        assert_eq!(json, r#"{"numeric":{"precision":5,"scale":2}}"#);
        let back: StorageType = serde_json::from_str(r#""timestamp_tz""#)?;
        assert_eq!(back, StorageType::TimestampTz);
        Ok(())
    }
}
