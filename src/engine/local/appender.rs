use std::sync::Arc;

use tracing::debug;

use super::storage::CHUNK_ROWS;
use super::TableSlot;
use crate::engine::wire::{self, numeric_fits};
use crate::engine::{Appender, EngineError, Interval, RowChunk};
use crate::types::StorageType;

/// Buffers rows for one table and hands them over on `execute`. Dropping it
/// without executing discards everything appended.
pub struct LocalAppender<'c> {
    slot: &'c mut TableSlot,
    insert_types: Vec<StorageType>,
    done: Vec<RowChunk>,
    current: RowChunk,
    column: usize,
    rows: u64,
}

impl<'c> LocalAppender<'c> {
    pub(super) fn new(slot: &'c mut TableSlot, insert_types: Vec<StorageType>) -> Self {
        let num_columns = insert_types.len();
        Self {
            slot,
            insert_types,
            done: Vec::new(),
            current: RowChunk::new(num_columns),
            column: 0,
            rows: 0,
        }
    }

    /// Check that the next column takes a value of `kind`, returning its
    /// insert type.
    fn check_next(
        &self,
        kind: &str,
        accepts: impl Fn(&StorageType) -> bool,
    ) -> Result<StorageType, EngineError> {
        let Some(ty) = self.insert_types.get(self.column) else {
            return Err(EngineError::Append(format!(
                "row already has {} values",
                self.insert_types.len()
            )));
        };
        if !accepts(ty) {
            return Err(EngineError::Append(format!(
                "cannot add {kind} to column '{}' of type {ty}",
                self.column_name()
            )));
        }
        Ok(*ty)
    }

    fn column_name(&self) -> &str {
        self.slot
            .definition
            .columns
            .get(self.column)
            .map(|c| c.name.as_str())
            .unwrap_or("?")
    }

    fn column_type(&self) -> Option<StorageType> {
        self.slot
            .definition
            .columns
            .get(self.column)
            .map(|c| c.storage_type)
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.current.push_value(bytes);
        self.column += 1;
        Ok(())
    }
}

impl Appender for LocalAppender<'_> {
    fn add_null(&mut self) -> Result<(), EngineError> {
        if self.column >= self.insert_types.len() {
            return Err(EngineError::Append(format!(
                "row already has {} values",
                self.insert_types.len()
            )));
        }
        if !self.slot.definition.columns[self.column].nullable {
            return Err(EngineError::Append(format!(
                "null value in NOT NULL column '{}'",
                self.column_name()
            )));
        }
        self.current.push_null();
        self.column += 1;
        Ok(())
    }

    fn add_i16(&mut self, value: i16) -> Result<(), EngineError> {
        self.check_next("SMALLINT", |t| *t == StorageType::SmallInt)?;
        self.push(&value.to_le_bytes())
    }

    fn add_i32(&mut self, value: i32) -> Result<(), EngineError> {
        self.check_next("INT", |t| *t == StorageType::Int)?;
        self.push(&value.to_le_bytes())
    }

    fn add_i64(&mut self, value: i64) -> Result<(), EngineError> {
        self.check_next("BIGINT", |t| *t == StorageType::BigInt)?;
        self.push(&value.to_le_bytes())
    }

    fn add_u32(&mut self, value: u32) -> Result<(), EngineError> {
        self.check_next("OID", |t| *t == StorageType::Oid)?;
        self.push(&value.to_le_bytes())
    }

    fn add_f64(&mut self, value: f64) -> Result<(), EngineError> {
        self.check_next("DOUBLE", |t| *t == StorageType::Double)?;
        self.push(&value.to_le_bytes())
    }

    fn add_bool(&mut self, value: bool) -> Result<(), EngineError> {
        self.check_next("BOOL", |t| *t == StorageType::Bool)?;
        self.push(&[u8::from(value)])
    }

    fn add_text(&mut self, value: &str) -> Result<(), EngineError> {
        self.check_next("text", StorageType::is_textual)?;
        // The limit belongs to the table column, whatever the insert type.
        let ty = self.column_type();
        if let Some(ty @ (StorageType::Varchar(limit) | StorageType::Char(limit))) = ty {
            let len = value.chars().count();
            if len > limit as usize {
                return Err(EngineError::Append(format!(
                    "value of length {len} too long for column '{}' of type {ty}",
                    self.column_name()
                )));
            }
        }
        self.push(value.as_bytes())
    }

    fn add_bytes(&mut self, value: &[u8]) -> Result<(), EngineError> {
        self.check_next("bytes", |t| {
            matches!(t, StorageType::Bytes | StorageType::Geography)
        })?;
        self.push(value)
    }

    fn add_date(&mut self, julian_day: u32) -> Result<(), EngineError> {
        self.check_next("DATE", |t| *t == StorageType::Date)?;
        self.push(&julian_day.to_le_bytes())
    }

    fn add_time(&mut self, micros: i64) -> Result<(), EngineError> {
        self.check_next("TIME", |t| *t == StorageType::Time)?;
        self.push(&micros.to_le_bytes())
    }

    fn add_timestamp(&mut self, micros: i64) -> Result<(), EngineError> {
        self.check_next("TIMESTAMP", |t| {
            matches!(t, StorageType::Timestamp | StorageType::TimestampTz)
        })?;
        self.push(&micros.to_le_bytes())
    }

    fn add_interval(&mut self, value: Interval) -> Result<(), EngineError> {
        self.check_next("INTERVAL", |t| *t == StorageType::Interval)?;
        self.push(&wire::encode_interval(value))
    }

    fn add_numeric(&mut self, unscaled: i128) -> Result<(), EngineError> {
        let insert = self.check_next("NUMERIC", |t| matches!(t, StorageType::Numeric { .. }))?;
        let precision = match insert {
            StorageType::Numeric { precision, .. } => precision,
            _ => 0,
        };
        let encoded = numeric_fits(unscaled, precision)
            .then(|| wire::encode_numeric(unscaled, precision))
            .flatten()
            .ok_or_else(|| {
                EngineError::Append(format!(
                    "numeric value {unscaled} exceeds precision {precision}"
                ))
            })?;
        self.push(&encoded)
    }

    fn end_row(&mut self) -> Result<(), EngineError> {
        if !self.current.end_row() {
            return Err(EngineError::Append(format!(
                "row ended after {} of {} values",
                self.column,
                self.insert_types.len()
            )));
        }
        self.column = 0;
        self.rows += 1;
        if self.current.num_rows() == CHUNK_ROWS {
            let next = RowChunk::new(self.insert_types.len());
            self.done.push(std::mem::replace(&mut self.current, next));
        }
        Ok(())
    }

    fn execute(mut self: Box<Self>) -> Result<u64, EngineError> {
        if self.column != 0 {
            return Err(EngineError::Append(format!(
                "unfinished row with {} values",
                self.column
            )));
        }
        if !self.current.is_empty() {
            let last = std::mem::take(&mut self.current);
            self.done.push(last);
        }
        let done = std::mem::take(&mut self.done);
        let rows = self.slot.rows.get_or_insert_with(Default::default);
        Arc::make_mut(rows).extend(done);
        self.slot.row_count += self.rows;
        debug!(table = %self.slot.definition.name, rows = self.rows, "appender executed");
        Ok(self.rows)
    }
}
