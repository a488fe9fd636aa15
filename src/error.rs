use std::fmt;
use std::io;

use thiserror::Error;

use crate::engine::EngineError;
use crate::reconcile::SchemaMismatch;
use crate::types::TableName;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the write and read paths surface to their caller.
///
/// None of these are retried internally; the only condition recovered
/// silently is appending to a table that does not exist yet, which falls
/// back to creating it.
#[derive(Debug, Error)]
pub enum Error {
    /// A column whose type has no storage (write) or logical (read) mapping.
    #[error("Unsupported {direction} type for column '{column}' (index {index}): {type_name}")]
    UnsupportedType {
        direction: Direction,
        column: String,
        index: usize,
        type_name: String,
    },

    /// Two or more columns of a batch share a name. Lists every offender.
    #[error("Duplicate column names found: [{}]", format_duplicates(.0))]
    DuplicateColumns(Vec<(usize, String)>),

    /// The same table was handed to one multi-table write more than once.
    #[error("Duplicate table names in one write: [{}]", format_tables(.0))]
    DuplicateTables(Vec<TableName>),

    /// Append-mode reconciliation failed; nothing was written.
    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatch),

    /// A single cell could not be converted.
    #[error(
        "Cannot convert value at row {row}, column {column} ('{name}') from {source_type} to {target_type}: {reason}"
    )]
    ValueConversion {
        row: usize,
        column: usize,
        name: String,
        source_type: String,
        target_type: String,
        reason: String,
    },

    /// An interval read back with a calendar-month component.
    #[error("Cannot read intervals with month components (row {row}, column '{name}', months = {months})")]
    UnsupportedInterval {
        row: usize,
        name: String,
        months: i32,
    },

    #[error("'table_mode' must be either 'w' or 'a', got '{0}'")]
    InvalidTableMode(String),

    /// An options file that could not be read or parsed.
    #[error("invalid options file {path}: {message}")]
    Config { path: String, message: String },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The staged file could not be moved over the destination.
    #[error("failed to replace {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Which side of the mapping rejected a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Arrow type with no storage type (write path).
    Arrow,
    /// Engine type with no Arrow type (read path).
    Engine,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Arrow => f.write_str("Arrow"),
            Direction::Engine => f.write_str("engine"),
        }
    }
}

fn format_duplicates(dups: &[(usize, String)]) -> String {
    dups.iter()
        .map(|(idx, name)| format!("{name} (index {idx})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_tables(tables: &[TableName]) -> String {
    tables
        .iter()
        .map(TableName::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reason a single value failed to convert, before the caller attaches the
/// row and column it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellError {
    OutOfRange(String),
    NullInNotNullColumn,
    Malformed(String),
    MonthComponent(i32),
    Engine(String),
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellError::OutOfRange(msg) => write!(f, "value out of range: {msg}"),
            CellError::NullInNotNullColumn => f.write_str("null value in NOT NULL column"),
            CellError::Malformed(msg) => write!(f, "malformed value: {msg}"),
            CellError::MonthComponent(months) => write!(f, "interval has {months} months"),
            CellError::Engine(msg) => write!(f, "rejected by engine: {msg}"),
        }
    }
}

impl std::error::Error for CellError {}

impl From<EngineError> for CellError {
    fn from(e: EngineError) -> Self {
        CellError::Engine(e.to_string())
    }
}

/// Where a failing cell lives; turns a [`CellError`] into an [`Error`].
#[derive(Debug, Clone)]
pub struct CellLocation<'a> {
    pub row: usize,
    pub column: usize,
    pub name: &'a str,
    pub source_type: String,
    pub target_type: String,
}

impl CellLocation<'_> {
    pub fn error(self, cause: CellError) -> Error {
        match cause {
            CellError::MonthComponent(months) => Error::UnsupportedInterval {
                row: self.row,
                name: self.name.to_string(),
                months,
            },
            other => Error::ValueConversion {
                row: self.row,
                column: self.column,
                name: self.name.to_string(),
                source_type: self.source_type,
                target_type: self.target_type,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_message_lists_every_index() {
        let err = Error::DuplicateColumns(vec![(0, "1".into()), (1, "1".into())]);
        assert_eq!(
            err.to_string(),
            "Duplicate column names found: [1 (index 0), 1 (index 1)]"
        );
    }

    #[test]
    fn month_component_becomes_interval_error() {
        let loc = CellLocation {
            row: 4,
            column: 2,
            name: "span",
            source_type: "INTERVAL".into(),
            target_type: "Interval(MonthDayNano)".into(),
        };
        let err = loc.error(CellError::MonthComponent(3));
        assert!(matches!(err, Error::UnsupportedInterval { row: 4, months: 3, .. }));
        assert!(err
            .to_string()
            .starts_with("Cannot read intervals with month components"));
    }

    #[test]
    fn conversion_error_names_row_and_column() {
        let loc = CellLocation {
            row: 7,
            column: 1,
            name: "amount",
            source_type: "Decimal128(5, 2)".into(),
            target_type: "NUMERIC(5,2)".into(),
        };
        let msg = loc
            .error(CellError::OutOfRange("1000.00 exceeds precision 5".into()))
            .to_string();
        assert!(msg.contains("row 7"));
        assert!(msg.contains("column 1 ('amount')"));
        assert!(msg.contains("Decimal128(5, 2)"));
        assert!(msg.contains("NUMERIC(5,2)"));
    }
}
