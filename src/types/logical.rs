use arrow::datatypes::{DataType, IntervalUnit, TimeUnit};
use std::fmt;
use std::sync::Arc;

/// Physical layout of a string or binary column; all three carry the same
/// values, they differ only in offsets width or view encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    Small,
    Large,
    View,
}

/// The column types this crate knows how to move, derived once per column
/// from an Arrow [`DataType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt32,
    Float32,
    Float64,
    Bool,
    Utf8(Layout),
    Binary(Layout),
    FixedSizeBinary(i32),
    Date32,
    /// Time of day; second/millisecond arrive as Time32, micro/nano as Time64.
    Time(TimeUnit),
    Timestamp(TimeUnit, Option<Arc<str>>),
    IntervalMonthDayNano,
    Decimal128 { precision: u8, scale: i8 },
    Unsupported(DataType),
}

impl From<&DataType> for LogicalType {
    fn from(dt: &DataType) -> Self {
        match dt {
            DataType::Int8 => LogicalType::Int8,
            DataType::Int16 => LogicalType::Int16,
            DataType::Int32 => LogicalType::Int32,
            DataType::Int64 => LogicalType::Int64,
            DataType::UInt32 => LogicalType::UInt32,
            DataType::Float32 => LogicalType::Float32,
            DataType::Float64 => LogicalType::Float64,
            DataType::Boolean => LogicalType::Bool,
            DataType::Utf8 => LogicalType::Utf8(Layout::Small),
            DataType::LargeUtf8 => LogicalType::Utf8(Layout::Large),
            DataType::Utf8View => LogicalType::Utf8(Layout::View),
            DataType::Binary => LogicalType::Binary(Layout::Small),
            DataType::LargeBinary => LogicalType::Binary(Layout::Large),
            DataType::BinaryView => LogicalType::Binary(Layout::View),
            DataType::FixedSizeBinary(width) => LogicalType::FixedSizeBinary(*width),
            DataType::Date32 => LogicalType::Date32,
            DataType::Time32(unit @ (TimeUnit::Second | TimeUnit::Millisecond)) => {
                LogicalType::Time(*unit)
            }
            DataType::Time64(unit @ (TimeUnit::Microsecond | TimeUnit::Nanosecond)) => {
                LogicalType::Time(*unit)
            }
            DataType::Timestamp(unit, tz) => LogicalType::Timestamp(*unit, tz.clone()),
            DataType::Interval(IntervalUnit::MonthDayNano) => LogicalType::IntervalMonthDayNano,
            DataType::Decimal128(precision, scale) => LogicalType::Decimal128 {
                precision: *precision,
                scale: *scale,
            },
            other => LogicalType::Unsupported(other.clone()),
        }
    }
}

impl LogicalType {
    /// The Arrow type a column of this logical type is built as.
    pub fn to_arrow(&self) -> DataType {
        match self {
            LogicalType::Int8 => DataType::Int8,
            LogicalType::Int16 => DataType::Int16,
            LogicalType::Int32 => DataType::Int32,
            LogicalType::Int64 => DataType::Int64,
            LogicalType::UInt32 => DataType::UInt32,
            LogicalType::Float32 => DataType::Float32,
            LogicalType::Float64 => DataType::Float64,
            LogicalType::Bool => DataType::Boolean,
            LogicalType::Utf8(Layout::Small) => DataType::Utf8,
            LogicalType::Utf8(Layout::Large) => DataType::LargeUtf8,
            LogicalType::Utf8(Layout::View) => DataType::Utf8View,
            LogicalType::Binary(Layout::Small) => DataType::Binary,
            LogicalType::Binary(Layout::Large) => DataType::LargeBinary,
            LogicalType::Binary(Layout::View) => DataType::BinaryView,
            LogicalType::FixedSizeBinary(width) => DataType::FixedSizeBinary(*width),
            LogicalType::Date32 => DataType::Date32,
            LogicalType::Time(unit @ (TimeUnit::Second | TimeUnit::Millisecond)) => {
                DataType::Time32(*unit)
            }
            LogicalType::Time(unit) => DataType::Time64(*unit),
            LogicalType::Timestamp(unit, tz) => DataType::Timestamp(*unit, tz.clone()),
            LogicalType::IntervalMonthDayNano => DataType::Interval(IntervalUnit::MonthDayNano),
            LogicalType::Decimal128 { precision, scale } => {
                DataType::Decimal128(*precision, *scale)
            }
            LogicalType::Unsupported(dt) => dt.clone(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, LogicalType::Utf8(_))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, LogicalType::Binary(_) | LogicalType::FixedSizeBinary(_))
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_arrow())
    }
}
