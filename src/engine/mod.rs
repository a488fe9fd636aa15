//! The boundary to the columnar engine.
//!
//! Everything above this module talks to the engine through these traits
//! only: open a database file, manage tables, append rows through an
//! [`Appender`], and pull query results as [`RowChunk`]s. [`local`] is the
//! bundled file-backed implementation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::ops::Range;
use std::path::Path;

use thiserror::Error;

use crate::types::{StorageType, TableName};

pub mod local;
pub mod wire;

pub use local::LocalEngine;

/// Settings forwarded to the engine process at open time. Ordered so that
/// validation failures are reported deterministically.
pub type ProcessParams = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No internal setting named '{0}'")]
    UnknownSetting(String),

    #[error("invalid value '{value}' for setting '{key}': {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("database file {0} does not exist")]
    DatabaseNotFound(String),

    #[error("database {0} was opened read-only")]
    ReadOnly(String),

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("schema {0} does not exist")]
    SchemaNotFound(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("append rejected: {0}")]
    Append(String),

    #[error("corrupt database {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error("catalog error: {0}")]
    Catalog(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Never writes; opening a missing file fails.
    ReadOnly,
    /// Opens the file if present, otherwise starts an empty database.
    CreateIfNotExists,
    /// Starts an empty database regardless of what is on disk.
    CreateAndReplace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    pub nullable: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, storage_type: StorageType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            storage_type,
            nullable,
        }
    }
}

impl fmt::Display for ColumnDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(Name={}, Type={}, Nullability={})",
            self.name,
            self.storage_type,
            if self.nullable { "NULLABLE" } else { "NOT NULLABLE" }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: TableName,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn new(name: TableName, columns: Vec<ColumnDefinition>) -> Self {
        Self { name, columns }
    }
}

/// An INTERVAL cell: months, days and microseconds kept apart, the way the
/// engine stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

pub trait Engine {
    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        params: &ProcessParams,
    ) -> Result<Box<dyn Connection>, EngineError>;
}

/// A session on one database file. Changes become durable only through
/// [`Connection::commit`]; dropping a connection discards them.
pub trait Connection {
    fn create_schema_if_not_exists(&mut self, schema: &str) -> Result<(), EngineError>;

    /// `None` when the table does not exist.
    fn table_definition(
        &mut self,
        table: &TableName,
    ) -> Result<Option<TableDefinition>, EngineError>;

    /// Create a table; with `replace` an existing table and its rows are
    /// dropped first.
    fn create_table(&mut self, definition: &TableDefinition, replace: bool)
        -> Result<(), EngineError>;

    /// Start appending to an existing table. `insert_types` may differ from
    /// the table's column types where the engine casts on insert (TEXT into
    /// GEOGRAPHY).
    fn appender<'c>(
        &'c mut self,
        table: &TableName,
        insert_types: &[StorageType],
    ) -> Result<Box<dyn Appender + 'c>, EngineError>;

    fn execute_query(
        &mut self,
        query: &str,
        chunk_size: Option<usize>,
    ) -> Result<Box<dyn RowSet>, EngineError>;

    /// Every table in every schema, sorted.
    fn list_tables(&mut self) -> Result<Vec<TableName>, EngineError>;

    fn commit(self: Box<Self>) -> Result<(), EngineError>;
}

/// Row-at-a-time, column-ordered appends. Rows are only visible to the
/// connection once [`Appender::execute`] returns.
pub trait Appender {
    fn add_null(&mut self) -> Result<(), EngineError>;
    fn add_i16(&mut self, value: i16) -> Result<(), EngineError>;
    fn add_i32(&mut self, value: i32) -> Result<(), EngineError>;
    fn add_i64(&mut self, value: i64) -> Result<(), EngineError>;
    fn add_u32(&mut self, value: u32) -> Result<(), EngineError>;
    fn add_f64(&mut self, value: f64) -> Result<(), EngineError>;
    fn add_bool(&mut self, value: bool) -> Result<(), EngineError>;
    fn add_text(&mut self, value: &str) -> Result<(), EngineError>;
    fn add_bytes(&mut self, value: &[u8]) -> Result<(), EngineError>;
    /// Julian day number.
    fn add_date(&mut self, julian_day: u32) -> Result<(), EngineError>;
    /// Microseconds since midnight.
    fn add_time(&mut self, micros: i64) -> Result<(), EngineError>;
    /// Microseconds since the Julian epoch.
    fn add_timestamp(&mut self, micros: i64) -> Result<(), EngineError>;
    fn add_interval(&mut self, value: Interval) -> Result<(), EngineError>;
    /// Unscaled value; the column's precision decides the wire width.
    fn add_numeric(&mut self, unscaled: i128) -> Result<(), EngineError>;
    fn end_row(&mut self) -> Result<(), EngineError>;
    fn execute(self: Box<Self>) -> Result<u64, EngineError>;
}

/// A query result. Owns its data so it can outlive the call that made it.
pub trait RowSet {
    fn columns(&self) -> &[ColumnDefinition];
    /// `None` once the result is exhausted.
    fn next_chunk(&mut self) -> Result<Option<RowChunk>, EngineError>;
}

/// A block of rows in wire layout, row-major. Each cell is either null or
/// the bytes of one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowChunk {
    num_columns: usize,
    num_rows: usize,
    data: Vec<u8>,
    cells: Vec<Option<Range<usize>>>,
}

impl RowChunk {
    pub fn new(num_columns: usize) -> Self {
        Self {
            num_columns,
            ..Default::default()
        }
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn push_value(&mut self, bytes: &[u8]) {
        let start = self.data.len();
        self.data.extend_from_slice(bytes);
        self.cells.push(Some(start..self.data.len()));
    }

    pub fn push_null(&mut self) {
        self.cells.push(None);
    }

    pub fn push_cell(&mut self, cell: Option<&[u8]>) {
        match cell {
            Some(bytes) => self.push_value(bytes),
            None => self.push_null(),
        }
    }

    /// Cells pushed since the last completed row.
    pub fn pending_cells(&self) -> usize {
        self.cells.len() - self.num_rows * self.num_columns
    }

    /// Close the current row. Returns false (and leaves the chunk alone) if
    /// the row does not have exactly one cell per column.
    pub fn end_row(&mut self) -> bool {
        if self.pending_cells() != self.num_columns {
            return false;
        }
        self.num_rows += 1;
        true
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&[u8]> {
        let idx = row * self.num_columns + column;
        self.cells
            .get(idx)
            .and_then(|c| c.as_ref())
            .map(|range| &self.data[range.clone()])
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = Option<&[u8]>> + '_ {
        (0..self.num_columns).map(move |column| self.cell(row, column))
    }
}
