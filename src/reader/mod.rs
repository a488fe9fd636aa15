//! Turns engine query results back into Arrow batches.

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use tracing::debug;

use crate::codec::ColumnDecoder;
use crate::engine::{Connection, RowChunk, RowSet};
use crate::error::{Error, Result};
use crate::plan::{arrow_schema, plan_read, ColumnPlan};

/// Decode one chunk into a batch. `row_offset` is the number of rows in
/// earlier chunks, for error positions.
pub fn decode_chunk(
    plans: &[ColumnPlan],
    schema: &SchemaRef,
    chunk: &RowChunk,
    row_offset: usize,
) -> Result<RecordBatch> {
    if chunk.num_columns() != plans.len() {
        return Err(ArrowError::SchemaError(format!(
            "chunk has {} columns, expected {}",
            chunk.num_columns(),
            plans.len()
        ))
        .into());
    }
    let num_rows = chunk.num_rows();
    let mut decoders = plans
        .iter()
        .map(|p| ColumnDecoder::new(p.codec, num_rows))
        .collect::<Result<Vec<_>, _>>()?;

    for row in 0..num_rows {
        for ((plan, decoder), cell) in plans.iter().zip(decoders.iter_mut()).zip(chunk.row(row)) {
            decoder
                .decode(cell)
                .map_err(|e| plan.read_location(row_offset + row).error(e))?;
        }
    }

    let columns = decoders.iter_mut().map(ColumnDecoder::finish).collect();
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(
        schema.clone(),
        columns,
        &options,
    )?)
}

/// Run `query` on a borrowed connection and decode the whole result.
pub fn read_all(
    conn: &mut dyn Connection,
    query: &str,
    chunk_size: Option<usize>,
) -> Result<RecordBatch> {
    let mut rows = conn.execute_query(query, chunk_size)?;
    let plans = plan_read(rows.columns())?;
    let schema = arrow_schema(&plans);

    let mut batches = Vec::new();
    let mut row_offset = 0;
    while let Some(chunk) = rows.next_chunk()? {
        let batch = decode_chunk(&plans, &schema, &chunk, row_offset)?;
        row_offset += batch.num_rows();
        batches.push(batch);
    }
    Ok(concat_batches(&schema, &batches)?)
}

/// A lazily decoded query result. Holds the connection open until dropped.
pub struct BatchStream {
    schema: SchemaRef,
    plans: Vec<ColumnPlan>,
    rows: Box<dyn RowSet>,
    // Dropped after `rows`.
    _conn: Box<dyn Connection>,
    row_offset: usize,
    done: bool,
}

impl BatchStream {
    /// Run `query` on `conn` and plan its columns. Type errors surface here,
    /// before any rows are pulled.
    #[tracing::instrument(level = "debug", skip(conn))]
    pub fn open(
        mut conn: Box<dyn Connection>,
        query: &str,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        let rows = conn.execute_query(query, chunk_size)?;
        let plans = plan_read(rows.columns())?;
        let schema = arrow_schema(&plans);
        debug!(columns = plans.len(), "query planned");
        Ok(Self {
            schema,
            plans,
            rows,
            _conn: conn,
            row_offset: 0,
            done: false,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Drain the stream into a single batch.
    pub fn collect_batch(self) -> Result<RecordBatch> {
        let schema = self.schema.clone();
        let batches = self.collect::<Result<Vec<_>>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        let Some(chunk) = self.rows.next_chunk()? else {
            return Ok(None);
        };
        let batch = decode_chunk(&self.plans, &self.schema, &chunk, self.row_offset)?;
        self.row_offset += batch.num_rows();
        Ok(Some(batch))
    }
}

impl Iterator for BatchStream {
    type Item = Result<RecordBatch, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
