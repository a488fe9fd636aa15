//! Moves a stream of Arrow batches into one engine table.

use arrow::array::RecordBatchReader;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use tracing::{debug, info};

use crate::codec::ColumnEncoder;
use crate::engine::{Appender, Connection};
use crate::error::Result;
use crate::options::TableMode;
use crate::plan::{plan_write, table_definition, ColumnOptions, ColumnPlan};
use crate::reconcile::reconcile;
use crate::types::TableName;

/// Write every batch of `source` into `table` through `conn`.
///
/// Nothing is committed here: on error the caller drops the connection and
/// the database is left as it was. Returns the number of rows appended.
#[tracing::instrument(level = "info", skip_all, fields(table = %table, mode = %mode))]
pub fn write_table(
    conn: &mut dyn Connection,
    table: &TableName,
    mode: TableMode,
    source: &mut dyn RecordBatchReader,
    options: &ColumnOptions,
) -> Result<u64> {
    // 1) Plan from the stream's schema.
    let plans = plan_write(&source.schema(), options)?;
    let definition = table_definition(table, &plans);

    // 2) Make sure the table exists and matches.
    conn.create_schema_if_not_exists(table.schema())?;
    match (mode, conn.table_definition(table)?) {
        (TableMode::Append, Some(existing)) => {
            reconcile(&definition.columns, &existing.columns)?;
            debug!("appending to existing table");
        }
        (TableMode::Append, None) => {
            debug!("table missing, creating it");
            conn.create_table(&definition, false)?;
        }
        (TableMode::Write, _) => conn.create_table(&definition, true)?,
    }

    // 3) Stream rows through the appender.
    let insert_types: Vec<_> = plans.iter().map(|p| p.insert_type).collect();
    let mut appender = conn.appender(table, &insert_types)?;
    let mut row_offset = 0;
    for batch in source {
        let batch = batch?;
        append_batch(appender.as_mut(), &plans, &batch, row_offset)?;
        row_offset += batch.num_rows();
    }

    // 4) Hand the rows to the connection.
    let rows = appender.execute()?;
    info!(rows, "table written");
    Ok(rows)
}

/// Append one batch. `row_offset` is the number of rows in earlier batches,
/// so errors report the row's position in the whole stream.
pub fn append_batch(
    appender: &mut dyn Appender,
    plans: &[ColumnPlan],
    batch: &RecordBatch,
    row_offset: usize,
) -> Result<()> {
    if batch.num_columns() != plans.len() {
        return Err(ArrowError::SchemaError(format!(
            "batch has {} columns, expected {}",
            batch.num_columns(),
            plans.len()
        ))
        .into());
    }
    let encoders = plans
        .iter()
        .zip(batch.columns())
        .map(|(plan, array)| ColumnEncoder::bind(plan, array))
        .collect::<Result<Vec<_>, _>>()?;

    for row in 0..batch.num_rows() {
        for (plan, encoder) in plans.iter().zip(&encoders) {
            encoder
                .append(row, appender)
                .map_err(|e| plan.write_location(row_offset + row).error(e))?;
        }
        appender.end_row()?;
    }
    debug!(rows = batch.num_rows(), row_offset, "batch appended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, LocalEngine, OpenMode, ProcessParams};
    use crate::error::Error;
    use crate::types::StorageType;
    use arrow::array::{ArrayRef, Int16Array, RecordBatchIterator, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch(values: Vec<Option<i16>>, names: Vec<Option<&str>>) -> anyhow::Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("n", DataType::Int16, true),
            Field::new("s", DataType::Utf8, true),
        ]));
        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int16Array::from(values)) as ArrayRef,
                Arc::new(StringArray::from(names)) as ArrayRef,
            ],
        )?)
    }

    type BatchIter = std::vec::IntoIter<std::result::Result<RecordBatch, ArrowError>>;

    fn reader(batches: Vec<RecordBatch>) -> RecordBatchIterator<BatchIter> {
        let schema = batches[0].schema();
        RecordBatchIterator::new(batches.into_iter().map(Ok).collect::<Vec<_>>().into_iter(), schema)
    }

    #[test]
    fn errors_carry_the_stream_row_index() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("db");
        let mut conn = LocalEngine.open(&path, OpenMode::CreateAndReplace, &ProcessParams::new())?;
        let first = batch(vec![Some(1), Some(2)], vec![Some("a"), Some("b")])?;
        let second = batch(vec![Some(3), None], vec![Some("c"), Some("d")])?;
        let options = ColumnOptions {
            not_null: ["n".to_string()].into(),
            ..Default::default()
        };

        let err = write_table(
            conn.as_mut(),
            &TableName::new("t"),
            TableMode::Write,
            &mut reader(vec![first, second]),
            &options,
        )
        .unwrap_err();
        match err {
            Error::ValueConversion { row, column, name, .. } => {
                assert_eq!((row, column, name.as_str()), (3, 0, "n"));
            }
            other => panic!("unexpected error {other}"),
        }
        Ok(())
    }

    #[test]
    fn append_creates_missing_table_and_then_reconciles() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("db");
        let mut conn = LocalEngine.open(&path, OpenMode::CreateAndReplace, &ProcessParams::new())?;
        let table = TableName::new("t");
        let options = ColumnOptions::default();

        let rows = write_table(
            conn.as_mut(),
            &table,
            TableMode::Append,
            &mut reader(vec![batch(vec![Some(1)], vec![None])?]),
            &options,
        )?;
        assert_eq!(rows, 1);
        let def = conn.table_definition(&table)?.ok_or_else(|| anyhow::anyhow!("missing"))?;
        assert_eq!(def.columns[0].storage_type, StorageType::SmallInt);

        write_table(
            conn.as_mut(),
            &table,
            TableMode::Append,
            &mut reader(vec![batch(vec![Some(2)], vec![Some("x")])?]),
            &options,
        )?;
        let mut result = conn.execute_query(&format!("SELECT * FROM {}", table.to_sql()), None)?;
        let chunk = result.next_chunk()?.ok_or_else(|| anyhow::anyhow!("no rows"))?;
        assert_eq!(chunk.num_rows(), 2);
        Ok(())
    }
}
