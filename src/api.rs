//! The public entry points: write Arrow data into a database file, read it
//! back, and list what is there.
//!
//! [`Store`] is generic over the [`Engine`] so tests and embedders can swap
//! the engine; the free functions use the bundled [`LocalEngine`].

use arrow::array::{RecordBatchIterator, RecordBatchReader};
use arrow::record_batch::RecordBatch;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::info;

use crate::atomic::StagedFile;
use crate::engine::{Engine, LocalEngine, OpenMode};
use crate::error::{Error, Result};
use crate::options::{ReadOptions, WriteOptions};
use crate::reader::{read_all, BatchStream};
use crate::types::TableName;
use crate::writer;

/// A boxed batch source, so differently typed readers can share a list.
pub type BoxedReader<'a> = Box<dyn RecordBatchReader + 'a>;

#[derive(Debug, Clone, Default)]
pub struct Store<E: Engine = LocalEngine> {
    engine: E,
}

fn select_all(table: &TableName) -> String {
    format!("SELECT * FROM {}", table.to_sql())
}

impl<E: Engine> Store<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Write several tables into `path` in one go.
    ///
    /// All tables share one connection and, with `options.atomic`, one
    /// staged file: either every table lands or the destination is left
    /// byte-for-byte unchanged. Returns rows written per table.
    ///
    /// A table may appear only once per call.
    #[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn write_tables<'a, I>(
        &self,
        path: &Path,
        tables: I,
        options: &WriteOptions,
    ) -> Result<BTreeMap<TableName, u64>>
    where
        I: IntoIterator<Item = (TableName, BoxedReader<'a>)>,
    {
        // 1) Refuse repeated tables, then stage beside the destination.
        let tables: Vec<_> = tables.into_iter().collect();
        let mut seen = BTreeSet::new();
        let mut repeated = BTreeSet::new();
        for (table, _) in &tables {
            if !seen.insert(table) {
                repeated.insert(table.clone());
            }
        }
        if !repeated.is_empty() {
            return Err(Error::DuplicateTables(repeated.into_iter().collect()));
        }
        let staged = if options.atomic {
            Some(StagedFile::stage(path, true)?)
        } else {
            None
        };
        let target = staged.as_ref().map_or(path, StagedFile::path);

        // 2) One connection for every table.
        let mut conn = self
            .engine
            .open(target, OpenMode::CreateIfNotExists, &options.process_params)?;
        let columns = options.column_options();
        let mut written = BTreeMap::new();
        for (table, mut source) in tables {
            let rows = writer::write_table(
                conn.as_mut(),
                &table,
                options.table_mode,
                source.as_mut(),
                &columns,
            )?;
            written.insert(table, rows);
        }

        // 3) Persist, then publish.
        conn.commit()?;
        if let Some(staged) = staged {
            staged.commit()?;
        }
        info!(tables = written.len(), "write finished");
        Ok(written)
    }

    pub fn write_table<'a>(
        &self,
        path: &Path,
        table: impl Into<TableName>,
        source: impl RecordBatchReader + 'a,
        options: &WriteOptions,
    ) -> Result<u64> {
        let table = table.into();
        let source: BoxedReader<'a> = Box::new(source);
        let written = self.write_tables(path, [(table.clone(), source)], options)?;
        Ok(written.get(&table).copied().unwrap_or(0))
    }

    pub fn write_batch(
        &self,
        path: &Path,
        table: impl Into<TableName>,
        batch: RecordBatch,
        options: &WriteOptions,
    ) -> Result<u64> {
        let schema = batch.schema();
        let source = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.write_table(path, table, source, options)
    }

    /// Run a query and stream its result; the file stays open until the
    /// stream is dropped.
    pub fn stream_query(
        &self,
        path: &Path,
        query: &str,
        options: &ReadOptions,
    ) -> Result<BatchStream> {
        let conn = self
            .engine
            .open(path, OpenMode::ReadOnly, &options.process_params)?;
        BatchStream::open(conn, query, options.chunk_size)
    }

    pub fn read_query(
        &self,
        path: &Path,
        query: &str,
        options: &ReadOptions,
    ) -> Result<RecordBatch> {
        let mut conn = self
            .engine
            .open(path, OpenMode::ReadOnly, &options.process_params)?;
        read_all(conn.as_mut(), query, options.chunk_size)
    }

    pub fn stream_table(
        &self,
        path: &Path,
        table: impl Into<TableName>,
        options: &ReadOptions,
    ) -> Result<BatchStream> {
        self.stream_query(path, &select_all(&table.into()), options)
    }

    pub fn read_table(
        &self,
        path: &Path,
        table: impl Into<TableName>,
        options: &ReadOptions,
    ) -> Result<RecordBatch> {
        self.read_query(path, &select_all(&table.into()), options)
    }

    /// Read every table in every schema.
    #[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn read_tables(
        &self,
        path: &Path,
        options: &ReadOptions,
    ) -> Result<BTreeMap<TableName, RecordBatch>> {
        let mut conn = self
            .engine
            .open(path, OpenMode::ReadOnly, &options.process_params)?;
        let mut out = BTreeMap::new();
        for table in conn.list_tables()? {
            let batch = read_all(conn.as_mut(), &select_all(&table), options.chunk_size)?;
            out.insert(table, batch);
        }
        Ok(out)
    }

    pub fn list_tables(&self, path: &Path, options: &ReadOptions) -> Result<Vec<TableName>> {
        let mut conn = self
            .engine
            .open(path, OpenMode::ReadOnly, &options.process_params)?;
        Ok(conn.list_tables()?)
    }
}

pub fn write_tables<'a, I>(
    path: impl AsRef<Path>,
    tables: I,
    options: &WriteOptions,
) -> Result<BTreeMap<TableName, u64>>
where
    I: IntoIterator<Item = (TableName, BoxedReader<'a>)>,
{
    Store::<LocalEngine>::default().write_tables(path.as_ref(), tables, options)
}

pub fn write_table<'a>(
    path: impl AsRef<Path>,
    table: impl Into<TableName>,
    source: impl RecordBatchReader + 'a,
    options: &WriteOptions,
) -> Result<u64> {
    Store::<LocalEngine>::default().write_table(path.as_ref(), table, source, options)
}

pub fn write_batch(
    path: impl AsRef<Path>,
    table: impl Into<TableName>,
    batch: RecordBatch,
    options: &WriteOptions,
) -> Result<u64> {
    Store::<LocalEngine>::default().write_batch(path.as_ref(), table, batch, options)
}

pub fn read_table(
    path: impl AsRef<Path>,
    table: impl Into<TableName>,
    options: &ReadOptions,
) -> Result<RecordBatch> {
    Store::<LocalEngine>::default().read_table(path.as_ref(), table, options)
}

pub fn stream_table(
    path: impl AsRef<Path>,
    table: impl Into<TableName>,
    options: &ReadOptions,
) -> Result<BatchStream> {
    Store::<LocalEngine>::default().stream_table(path.as_ref(), table, options)
}

pub fn read_query(
    path: impl AsRef<Path>,
    query: &str,
    options: &ReadOptions,
) -> Result<RecordBatch> {
    Store::<LocalEngine>::default().read_query(path.as_ref(), query, options)
}

pub fn stream_query(
    path: impl AsRef<Path>,
    query: &str,
    options: &ReadOptions,
) -> Result<BatchStream> {
    Store::<LocalEngine>::default().stream_query(path.as_ref(), query, options)
}

pub fn read_tables(
    path: impl AsRef<Path>,
    options: &ReadOptions,
) -> Result<BTreeMap<TableName, RecordBatch>> {
    Store::<LocalEngine>::default().read_tables(path.as_ref(), options)
}

pub fn list_tables(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Vec<TableName>> {
    Store::<LocalEngine>::default().list_tables(path.as_ref(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        Appender, ColumnDefinition, Connection, EngineError, Interval, ProcessParams, RowSet,
        TableDefinition,
    };
    use crate::error::Error;
    use crate::options::TableMode;
    use crate::types::StorageType;
    use arrow::array::{
        Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Date32Array, Decimal128Array,
        FixedSizeBinaryArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
        Int8Array, IntervalMonthDayNanoArray, LargeBinaryArray, LargeStringArray, StringArray,
        StringViewArray, Time32MillisecondArray, Time64NanosecondArray,
        TimestampMicrosecondArray, TimestampSecondArray, UInt32Array,
    };
    use arrow::datatypes::{
        DataType, Date32Type, Decimal128Type, Float64Type, Int16Type, Int32Type,
        IntervalMonthDayNano, IntervalMonthDayNanoType, Time64MicrosecondType, TimeUnit,
        TimestampMicrosecondType,
    };
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,tabcodec=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn db(dir: &TempDir) -> PathBuf {
        dir.path().join("test.tcdb")
    }

    fn batch(columns: Vec<(&str, ArrayRef)>) -> anyhow::Result<RecordBatch> {
        Ok(RecordBatch::try_from_iter(columns)?)
    }

    fn int16_batch(values: &[i16]) -> anyhow::Result<RecordBatch> {
        batch(vec![(
            "int16",
            Arc::new(Int16Array::from(values.to_vec())) as ArrayRef,
        )])
    }

    fn source(batch: RecordBatch) -> BoxedReader<'static> {
        let schema = batch.schema();
        Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema))
    }

    fn int32_stream(chunks: &[Vec<Option<i32>>]) -> anyhow::Result<BoxedReader<'static>> {
        let batches = chunks
            .iter()
            .map(|c| batch(vec![("v", Arc::new(Int32Array::from(c.clone())) as ArrayRef)]))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let schema = batches[0].schema();
        Ok(Box::new(RecordBatchIterator::new(
            batches.into_iter().map(Ok),
            schema,
        )))
    }

    fn column<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a ArrayRef> {
        batch
            .column_by_name(name)
            .ok_or_else(|| anyhow::anyhow!("no column {name}"))
    }

    // ─── fault injection ────────────────────────────────────────────

    /// Wraps the local engine; appenders fail after `fail_after` values.
    struct FailingEngine {
        fail_after: usize,
    }

    struct FailingConnection {
        inner: Box<dyn Connection>,
        fail_after: usize,
    }

    struct FailingAppender<'c> {
        inner: Box<dyn Appender + 'c>,
        remaining: usize,
    }

    impl Engine for FailingEngine {
        fn open(
            &self,
            path: &Path,
            mode: OpenMode,
            params: &ProcessParams,
        ) -> std::result::Result<Box<dyn Connection>, EngineError> {
            Ok(Box::new(FailingConnection {
                inner: LocalEngine.open(path, mode, params)?,
                fail_after: self.fail_after,
            }))
        }
    }

    impl Connection for FailingConnection {
        fn create_schema_if_not_exists(
            &mut self,
            schema: &str,
        ) -> std::result::Result<(), EngineError> {
            self.inner.create_schema_if_not_exists(schema)
        }

        fn table_definition(
            &mut self,
            table: &TableName,
        ) -> std::result::Result<Option<TableDefinition>, EngineError> {
            self.inner.table_definition(table)
        }

        fn create_table(
            &mut self,
            definition: &TableDefinition,
            replace: bool,
        ) -> std::result::Result<(), EngineError> {
            self.inner.create_table(definition, replace)
        }

        fn appender<'c>(
            &'c mut self,
            table: &TableName,
            insert_types: &[StorageType],
        ) -> std::result::Result<Box<dyn Appender + 'c>, EngineError> {
            Ok(Box::new(FailingAppender {
                inner: self.inner.appender(table, insert_types)?,
                remaining: self.fail_after,
            }))
        }

        fn execute_query(
            &mut self,
            query: &str,
            chunk_size: Option<usize>,
        ) -> std::result::Result<Box<dyn RowSet>, EngineError> {
            self.inner.execute_query(query, chunk_size)
        }

        fn list_tables(&mut self) -> std::result::Result<Vec<TableName>, EngineError> {
            self.inner.list_tables()
        }

        fn commit(self: Box<Self>) -> std::result::Result<(), EngineError> {
            self.inner.commit()
        }
    }

    impl FailingAppender<'_> {
        fn tick(&mut self) -> std::result::Result<(), EngineError> {
            if self.remaining == 0 {
                return Err(EngineError::Append("injected failure".into()));
            }
            self.remaining -= 1;
            Ok(())
        }
    }

    macro_rules! forward {
        ($($name:ident($ty:ty)),* $(,)?) => {
            $(
                fn $name(&mut self, value: $ty) -> std::result::Result<(), EngineError> {
                    self.tick()?;
                    self.inner.$name(value)
                }
            )*
        };
    }

    impl Appender for FailingAppender<'_> {
        forward!(
            add_i16(i16),
            add_i32(i32),
            add_i64(i64),
            add_u32(u32),
            add_f64(f64),
            add_bool(bool),
            add_text(&str),
            add_bytes(&[u8]),
            add_date(u32),
            add_time(i64),
            add_timestamp(i64),
            add_interval(Interval),
            add_numeric(i128),
        );

        fn add_null(&mut self) -> std::result::Result<(), EngineError> {
            self.tick()?;
            self.inner.add_null()
        }

        fn end_row(&mut self) -> std::result::Result<(), EngineError> {
            self.inner.end_row()
        }

        fn execute(self: Box<Self>) -> std::result::Result<u64, EngineError> {
            self.inner.execute()
        }
    }

    // ─── round trips ────────────────────────────────────────────────

    #[test]
    fn int16_round_trip() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, "test", int16_batch(&[1, 2, 3])?, &WriteOptions::default())?;

        let back = read_table(&path, "test", &ReadOptions::default())?;
        assert_eq!(back.schema().field(0).data_type(), &DataType::Int16);
        let values = column(&back, "int16")?.as_primitive::<Int16Type>();
        assert_eq!(values.values().to_vec(), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn every_supported_type_round_trips() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let path = db(&dir);

        let input = batch(vec![
            ("i8", Arc::new(Int8Array::from(vec![Some(-8), None])) as ArrayRef),
            ("i32", Arc::new(Int32Array::from(vec![Some(i32::MIN), None]))),
            ("i64", Arc::new(Int64Array::from(vec![Some(i64::MAX), None]))),
            ("u32", Arc::new(UInt32Array::from(vec![Some(u32::MAX), None]))),
            ("f32", Arc::new(Float32Array::from(vec![Some(1.5f32), None]))),
            ("f64", Arc::new(Float64Array::from(vec![Some(-0.25), None]))),
            ("b", Arc::new(BooleanArray::from(vec![Some(true), None]))),
            ("s", Arc::new(StringArray::from(vec![Some("héllo"), None]))),
            ("ls", Arc::new(LargeStringArray::from(vec![Some("large"), None]))),
            (
                "sv",
                Arc::new(StringViewArray::from(vec![
                    Some("a string longer than twelve bytes"),
                    None,
                ])),
            ),
            (
                "bin",
                Arc::new(BinaryArray::from_opt_vec(vec![Some(&b"\x00\x01"[..]), None])),
            ),
            (
                "lbin",
                Arc::new(LargeBinaryArray::from_opt_vec(vec![Some(&b"xyz"[..]), None])),
            ),
            (
                "fsb",
                Arc::new(FixedSizeBinaryArray::try_from_sparse_iter_with_size(
                    vec![Some(vec![1u8, 2, 3]), None].into_iter(),
                    3,
                )?),
            ),
            ("d", Arc::new(Date32Array::from(vec![Some(19_000), None]))),
            (
                "t32",
                Arc::new(Time32MillisecondArray::from(vec![Some(3_723_004), None])),
            ),
            (
                "t64",
                Arc::new(Time64NanosecondArray::from(vec![Some(1_999), None])),
            ),
            (
                "ts",
                Arc::new(TimestampMicrosecondArray::from(vec![Some(-1_000_000), None])),
            ),
            (
                "tstz",
                Arc::new(
                    TimestampSecondArray::from(vec![Some(1_700_000_000), None])
                        .with_timezone("America/New_York"),
                ),
            ),
            (
                "iv",
                Arc::new(IntervalMonthDayNanoArray::from(vec![
                    Some(IntervalMonthDayNano::new(0, 3, 4_000_000)),
                    None,
                ])),
            ),
            (
                "dec",
                Arc::new(
                    Decimal128Array::from(vec![Some(-12_345), None])
                        .with_precision_and_scale(10, 2)?,
                ),
            ),
        ])?;
        write_batch(&path, "all_types", input, &WriteOptions::default())?;
        let back = read_table(&path, "all_types", &ReadOptions::default())?;

        let expected_types = [
            ("i8", DataType::Int16),
            ("i32", DataType::Int32),
            ("i64", DataType::Int64),
            ("u32", DataType::UInt32),
            ("f32", DataType::Float64),
            ("f64", DataType::Float64),
            ("b", DataType::Boolean),
            ("s", DataType::Utf8),
            ("ls", DataType::Utf8),
            ("sv", DataType::Utf8),
            ("bin", DataType::Binary),
            ("lbin", DataType::Binary),
            ("fsb", DataType::Binary),
            ("d", DataType::Date32),
            ("t32", DataType::Time64(TimeUnit::Microsecond)),
            ("t64", DataType::Time64(TimeUnit::Microsecond)),
            ("ts", DataType::Timestamp(TimeUnit::Microsecond, None)),
            (
                "tstz",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            ),
            ("iv", DataType::Interval(arrow::datatypes::IntervalUnit::MonthDayNano)),
            ("dec", DataType::Decimal128(10, 2)),
        ];
        for (name, dt) in &expected_types {
            let col = column(&back, name)?;
            assert_eq!(col.data_type(), dt, "{name}");
            assert_eq!(col.len(), 2, "{name}");
            assert!(col.is_null(1), "{name} second row should be null");
        }

        assert_eq!(column(&back, "i8")?.as_primitive::<Int16Type>().value(0), -8);
        assert_eq!(column(&back, "f32")?.as_primitive::<Float64Type>().value(0), 1.5);
        assert_eq!(column(&back, "s")?.as_string::<i32>().value(0), "héllo");
        assert_eq!(
            column(&back, "sv")?.as_string::<i32>().value(0),
            "a string longer than twelve bytes"
        );
        assert_eq!(column(&back, "fsb")?.as_binary::<i32>().value(0), &[1u8, 2, 3]);
        assert_eq!(column(&back, "d")?.as_primitive::<Date32Type>().value(0), 19_000);
        assert_eq!(
            column(&back, "t32")?.as_primitive::<Time64MicrosecondType>().value(0),
            3_723_004_000
        );
        // Nanoseconds floor to whole microseconds.
        assert_eq!(column(&back, "t64")?.as_primitive::<Time64MicrosecondType>().value(0), 1);
        assert_eq!(
            column(&back, "ts")?.as_primitive::<TimestampMicrosecondType>().value(0),
            -1_000_000
        );
        assert_eq!(
            column(&back, "tstz")?.as_primitive::<TimestampMicrosecondType>().value(0),
            1_700_000_000_000_000
        );
        assert_eq!(
            column(&back, "iv")?.as_primitive::<IntervalMonthDayNanoType>().value(0),
            IntervalMonthDayNano::new(0, 3, 4_000_000)
        );
        assert_eq!(column(&back, "dec")?.as_primitive::<Decimal128Type>().value(0), -12_345);
        Ok(())
    }

    #[test]
    fn decimal_boundaries() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let max_digits: i128 = 98_765_432_109_876_543_210_987_654_321_098_765_432;
        let scaled = vec![
            Some(0),
            Some(1),
            Some(-1),
            Some(10i128.pow(38) - 1),
            Some(-(10i128.pow(38) - 1)),
            None,
        ];
        let fractional = vec![
            Some(max_digits),
            Some(-max_digits),
            Some(0),
            Some(1),
            Some(-1),
            None,
        ];
        let input = batch(vec![
            (
                "p38s10",
                Arc::new(Decimal128Array::from(scaled.clone()).with_precision_and_scale(38, 10)?)
                    as ArrayRef,
            ),
            (
                "p38s38",
                Arc::new(
                    Decimal128Array::from(fractional.clone()).with_precision_and_scale(38, 38)?,
                ),
            ),
        ])?;
        write_batch(&path, "decimals", input, &WriteOptions::default())?;

        let back = read_table(&path, "decimals", &ReadOptions::default())?;
        let got: Vec<Option<i128>> = column(&back, "p38s10")?
            .as_primitive::<Decimal128Type>()
            .iter()
            .collect();
        assert_eq!(got, scaled);
        let got: Vec<Option<i128>> = column(&back, "p38s38")?
            .as_primitive::<Decimal128Type>()
            .iter()
            .collect();
        assert_eq!(got, fractional);
        Ok(())
    }

    #[test]
    fn decimal_literals_round_trip_at_their_scale() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        // "0.00", "0E-10", "100", "1.00", ".001", with their negatives.
        let cases: [(&str, u8, i8, i128); 5] = [
            ("zero", 5, 2, 0),
            ("tiny_zero", 12, 10, 0),
            ("hundred", 3, 0, 100),
            ("one", 3, 2, 100),
            ("milli", 3, 3, 1),
        ];
        let mut columns = Vec::new();
        for (name, precision, scale, unscaled) in cases {
            let array = Decimal128Array::from(vec![Some(unscaled), Some(-unscaled), None])
                .with_precision_and_scale(precision, scale)?;
            columns.push((name, Arc::new(array) as ArrayRef));
        }
        write_batch(&path, "decimals", batch(columns)?, &WriteOptions::default())?;

        let back = read_table(&path, "decimals", &ReadOptions::default())?;
        for (name, precision, scale, unscaled) in cases {
            let col = column(&back, name)?;
            assert_eq!(col.data_type(), &DataType::Decimal128(precision, scale), "{name}");
            let got: Vec<Option<i128>> = col.as_primitive::<Decimal128Type>().iter().collect();
            assert_eq!(got, vec![Some(unscaled), Some(-unscaled), None], "{name}");
        }
        Ok(())
    }

    #[test]
    fn decimal_over_precision_is_a_conversion_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = batch(vec![(
            "amount",
            Arc::new(
                Decimal128Array::from(vec![Some(1), Some(100_000)])
                    .with_precision_and_scale(5, 2)?,
            ) as ArrayRef,
        )])?;
        let err = write_batch(db(&dir), "t", input, &WriteOptions::default()).unwrap_err();
        assert!(
            matches!(err, Error::ValueConversion { row: 1, column: 0, .. }),
            "{err}"
        );
        assert!(err.to_string().contains("1000.00 exceeds precision 5"), "{err}");
        Ok(())
    }

    // ─── write modes & reconciliation ───────────────────────────────

    #[test]
    fn write_mode_replaces_and_append_mode_adds() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, "t", int16_batch(&[1, 2])?, &WriteOptions::default())?;
        write_batch(&path, "t", int16_batch(&[3])?, &WriteOptions::default())?;
        assert_eq!(read_table(&path, "t", &ReadOptions::default())?.num_rows(), 1);

        write_batch(&path, "t", int16_batch(&[4, 5])?, &WriteOptions::append())?;
        let back = read_table(&path, "t", &ReadOptions::default())?;
        let values = column(&back, "int16")?.as_primitive::<Int16Type>();
        assert_eq!(values.values().to_vec(), vec![3, 4, 5]);
        Ok(())
    }

    #[test]
    fn write_mode_leaves_other_tables_alone() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, "keep", int16_batch(&[1])?, &WriteOptions::default())?;
        write_batch(&path, "t", int16_batch(&[2, 3])?, &WriteOptions::default())?;
        write_batch(&path, "t", int16_batch(&[4])?, &WriteOptions::default())?;

        assert_eq!(
            list_tables(&path, &ReadOptions::default())?,
            vec![TableName::new("keep"), TableName::new("t")]
        );
        assert_eq!(read_table(&path, "keep", &ReadOptions::default())?.num_rows(), 1);
        assert_eq!(read_table(&path, "t", &ReadOptions::default())?.num_rows(), 1);
        Ok(())
    }

    #[test]
    fn append_with_widened_type_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, "t", int16_batch(&[1])?, &WriteOptions::default())?;
        let before = fs::read(&path)?;

        let widened = batch(vec![(
            "int16",
            Arc::new(Int64Array::from(vec![1i64])) as ArrayRef,
        )])?;
        let err = write_batch(&path, "t", widened, &WriteOptions::append()).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::SchemaMismatch(_)));
        assert!(msg.contains("index 0"), "{msg}");
        assert!(msg.contains("BIGINT") && msg.contains("SMALLINT"), "{msg}");
        assert_eq!(fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn append_with_missing_column_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let two = batch(vec![
            ("a", Arc::new(Int32Array::from(vec![1])) as ArrayRef),
            ("b", Arc::new(Int32Array::from(vec![2])) as ArrayRef),
        ])?;
        write_batch(&path, "t", two, &WriteOptions::default())?;

        let one = batch(vec![("a", Arc::new(Int32Array::from(vec![3])) as ArrayRef)])?;
        let err = write_batch(&path, "t", one, &WriteOptions::append()).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Number of columns in new table definition does not match existing"));
        Ok(())
    }

    #[test]
    fn appends_text_into_existing_varchar() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        {
            let mut conn =
                LocalEngine.open(&path, OpenMode::CreateIfNotExists, &ProcessParams::new())?;
            conn.create_table(
                &TableDefinition::new(
                    TableName::new("names"),
                    vec![ColumnDefinition::new("name", StorageType::Varchar(42), true)],
                ),
                false,
            )?;
            conn.commit()?;
        }

        let input = batch(vec![(
            "name",
            Arc::new(StringArray::from(vec!["ada", "grace"])) as ArrayRef,
        )])?;
        write_batch(&path, "names", input, &WriteOptions::append())?;
        let back = read_table(&path, "names", &ReadOptions::default())?;
        let names = column(&back, "name")?.as_string::<i32>();
        assert_eq!(names.value(1), "grace");
        Ok(())
    }

    #[test]
    fn oversized_text_is_rejected_by_existing_varchar() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        {
            let mut conn =
                LocalEngine.open(&path, OpenMode::CreateIfNotExists, &ProcessParams::new())?;
            conn.create_table(
                &TableDefinition::new(
                    TableName::new("codes"),
                    vec![ColumnDefinition::new("code", StorageType::Varchar(3), true)],
                ),
                false,
            )?;
            conn.commit()?;
        }
        let before = fs::read(&path)?;

        let input = batch(vec![(
            "code",
            Arc::new(StringArray::from(vec!["ada", "grace"])) as ArrayRef,
        )])?;
        let err = write_batch(&path, "codes", input, &WriteOptions::append()).unwrap_err();
        assert!(matches!(err, Error::ValueConversion { row: 1, .. }), "{err}");
        assert!(err.to_string().contains("too long"), "{err}");
        assert_eq!(fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn duplicate_column_names_are_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = batch(vec![
            ("1", Arc::new(Int16Array::from(vec![1i16])) as ArrayRef),
            ("1", Arc::new(Int16Array::from(vec![2i16])) as ArrayRef),
        ])?;
        let err = write_batch(db(&dir), "t", input, &WriteOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Duplicate column names found: [1 (index 0), 1 (index 1)]"
        );
        Ok(())
    }

    // ─── atomicity & purity ─────────────────────────────────────────

    #[test]
    fn failed_write_leaves_file_untouched() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, "t", int16_batch(&[1, 2, 3])?, &WriteOptions::default())?;
        let before_bytes = fs::read(&path)?;
        let before_mtime = fs::metadata(&path)?.modified()?;

        let failing = Store::new(FailingEngine { fail_after: 2 });
        let err = failing
            .write_batch(&path, "t", int16_batch(&[4, 5, 6])?, &WriteOptions::append())
            .unwrap_err();
        assert!(err.to_string().contains("injected failure"), "{err}");

        assert_eq!(fs::read(&path)?, before_bytes);
        assert_eq!(fs::metadata(&path)?.modified()?, before_mtime);
        let entries = fs::read_dir(dir.path())?.count();
        assert_eq!(entries, 1, "staged file left behind");
        Ok(())
    }

    #[test]
    fn multi_table_write_is_all_or_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let good = int16_batch(&[1])?;
        let bad = batch(vec![(
            "d",
            Arc::new(Decimal128Array::from(vec![100_000i128]).with_precision_and_scale(5, 2)?)
                as ArrayRef,
        )])?;
        let tables: Vec<(TableName, BoxedReader<'_>)> = vec![
            (
                TableName::new("good"),
                Box::new(RecordBatchIterator::new(vec![Ok(good.clone())], good.schema())),
            ),
            (
                TableName::new("bad"),
                Box::new(RecordBatchIterator::new(vec![Ok(bad.clone())], bad.schema())),
            ),
        ];
        assert!(write_tables(&path, tables, &WriteOptions::default()).is_err());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn unstaged_writes_still_swap_the_file_in() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let options = WriteOptions::default().with_atomic(false);
        write_batch(&path, "t", int16_batch(&[1, 2, 3])?, &options)?;
        let before = fs::read(&path)?;

        let append = WriteOptions::append().with_atomic(false);
        let failing = Store::new(FailingEngine { fail_after: 2 });
        let err = failing
            .write_batch(&path, "t", int16_batch(&[4, 5, 6])?, &append)
            .unwrap_err();
        assert!(err.to_string().contains("injected failure"), "{err}");
        assert_eq!(fs::read(&path)?, before);

        write_batch(&path, "t", int16_batch(&[4])?, &append)?;
        let back = read_table(&path, "t", &ReadOptions::default())?;
        let values = column(&back, "int16")?.as_primitive::<Int16Type>();
        assert_eq!(values.values().to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(fs::read_dir(dir.path())?.count(), 1, "temporary file left behind");
        Ok(())
    }

    #[test]
    fn repeated_tables_in_one_write_are_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let tables = vec![
            (TableName::new("t"), source(int16_batch(&[1])?)),
            (TableName::new("other"), source(int16_batch(&[2])?)),
            (TableName::new("t"), source(int16_batch(&[3, 4])?)),
        ];
        let err = write_tables(&path, tables, &WriteOptions::default()).unwrap_err();
        assert!(
            matches!(&err, Error::DuplicateTables(names) if names == &[TableName::new("t")]),
            "{err}"
        );
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn multi_batch_streams_keep_order_and_nulls() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let chunks = [
            vec![Some(1), None],
            vec![None, None, Some(5)],
            vec![Some(6), None],
        ];
        let written = write_tables(
            &path,
            [(TableName::new("t"), int32_stream(&chunks)?)],
            &WriteOptions::default(),
        )?;
        assert_eq!(written.get(&TableName::new("t")), Some(&7));

        let back = read_table(&path, "t", &ReadOptions::default())?;
        let values: Vec<_> = column(&back, "v")?.as_primitive::<Int32Type>().iter().collect();
        assert_eq!(values, chunks.concat());
        Ok(())
    }

    #[test]
    fn errors_in_later_batches_report_the_stream_row() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let chunks = [
            vec![Some(1), Some(2)],
            vec![Some(3), Some(4), Some(5)],
            vec![Some(6), None],
        ];
        let options = WriteOptions::default().with_not_null(["v"]);
        let err = write_tables(&path, [(TableName::new("t"), int32_stream(&chunks)?)], &options)
            .unwrap_err();
        assert!(matches!(err, Error::ValueConversion { row: 6, .. }), "{err}");
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn reads_do_not_modify_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, "t", int16_batch(&[1, 2])?, &WriteOptions::default())?;
        let before_bytes = fs::read(&path)?;
        let before_mtime = fs::metadata(&path)?.modified()?;

        read_table(&path, "t", &ReadOptions::default())?;
        read_tables(&path, &ReadOptions::default())?;
        list_tables(&path, &ReadOptions::default())?;
        read_query(&path, "SELECT 1", &ReadOptions::default())?;

        assert_eq!(fs::read(&path)?, before_bytes);
        assert_eq!(fs::metadata(&path)?.modified()?, before_mtime);
        Ok(())
    }

    // ─── names ──────────────────────────────────────────────────────

    #[test]
    fn hostile_table_names_round_trip_verbatim() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let names = [
            TableName::from("x\"; DROP TABLE y; --"),
            TableName::from("dotted.name"),
            TableName::from(("my \"schema\"", "it's")),
        ];
        for name in &names {
            write_batch(&path, name, int16_batch(&[7])?, &WriteOptions::append())?;
        }

        let mut listed = list_tables(&path, &ReadOptions::default())?;
        listed.sort();
        let mut expected = names.to_vec();
        expected.sort();
        assert_eq!(listed, expected);

        for name in &names {
            let back = read_table(&path, name, &ReadOptions::default())?;
            assert_eq!(back.num_rows(), 1, "{name}");
        }
        Ok(())
    }

    #[test]
    fn read_tables_covers_every_schema() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, ("other", "b"), int16_batch(&[1])?, &WriteOptions::default())?;
        write_batch(&path, "a", int16_batch(&[1, 2])?, &WriteOptions::default())?;

        let all = read_tables(&path, &ReadOptions::default())?;
        let keys: Vec<String> = all.keys().map(TableName::to_sql).collect();
        assert_eq!(keys, [r#""other"."b""#, r#""public"."a""#]);
        assert_eq!(all[&TableName::new("a")].num_rows(), 2);
        Ok(())
    }

    // ─── queries ────────────────────────────────────────────────────

    #[test]
    fn chunked_stream_yields_batches_of_chunk_size() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, "t", int16_batch(&[1, 2, 3, 4, 5])?, &WriteOptions::default())?;

        let stream = stream_table(&path, "t", &ReadOptions::default().with_chunk_size(2))?;
        assert_eq!(stream.schema().field(0).data_type(), &DataType::Int16);
        let sizes = stream
            .map(|b| b.map(|b| b.num_rows()))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(sizes, vec![2, 2, 1]);

        let whole = read_table(&path, "t", &ReadOptions::default().with_chunk_size(2))?;
        assert_eq!(whole.num_rows(), 5);
        Ok(())
    }

    #[test]
    fn duplicate_result_names_get_suffixes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        write_batch(&path, "t", int16_batch(&[1])?, &WriteOptions::default())?;

        let back = read_query(
            &path,
            r#"SELECT "int16" AS col, 2 AS col, 'x' AS col FROM "t""#,
            &ReadOptions::default(),
        )?;
        let names: Vec<String> = back
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, ["col", "col_1", "col_2"]);
        Ok(())
    }

    #[test]
    fn intervals_with_months_cannot_be_read() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        {
            let mut conn =
                LocalEngine.open(&path, OpenMode::CreateIfNotExists, &ProcessParams::new())?;
            let table = TableName::new("spans");
            conn.create_table(
                &TableDefinition::new(
                    table.clone(),
                    vec![ColumnDefinition::new("span", StorageType::Interval, true)],
                ),
                false,
            )?;
            {
                let mut app = conn.appender(&table, &[StorageType::Interval])?;
                app.add_interval(Interval {
                    months: 14,
                    days: 0,
                    micros: 0,
                })?;
                app.end_row()?;
                app.execute()?;
            }
            conn.commit()?;
        }

        let err = read_table(&path, "spans", &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedInterval { months: 14, .. }), "{err}");
        assert!(err
            .to_string()
            .starts_with("Cannot read intervals with month components"));
        Ok(())
    }

    #[test]
    fn negative_intervals_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let spans = vec![
            Some(IntervalMonthDayNano::new(0, -3, -1_500_000_000)),
            None,
            Some(IntervalMonthDayNano::new(0, 2, -86_400_000_000_000)),
        ];
        let input = batch(vec![(
            "span",
            Arc::new(IntervalMonthDayNanoArray::from(spans.clone())) as ArrayRef,
        )])?;
        write_batch(&path, "spans", input, &WriteOptions::default())?;

        let back = read_table(&path, "spans", &ReadOptions::default())?;
        let got = column(&back, "span")?.as_primitive::<IntervalMonthDayNanoType>();
        assert_eq!(got.iter().collect::<Vec<_>>(), spans);
        Ok(())
    }

    #[test]
    fn intervals_with_months_cannot_be_written() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = batch(vec![(
            "span",
            Arc::new(IntervalMonthDayNanoArray::from(vec![IntervalMonthDayNano::new(
                1, 0, 0,
            )])) as ArrayRef,
        )])?;
        let err = write_batch(db(&dir), "t", input, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ValueConversion { .. }), "{err}");
        Ok(())
    }

    // ─── options ────────────────────────────────────────────────────

    #[test]
    fn process_params_are_validated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let bad = WriteOptions::default().with_process_param("not_a_real_setting", "1");
        let err = write_batch(&path, "t", int16_batch(&[1])?, &bad).unwrap_err();
        assert_eq!(
            err.to_string(),
            "engine error: No internal setting named 'not_a_real_setting'"
        );

        let good = WriteOptions::default().with_process_param("default_database_version", "4");
        write_batch(&path, "t", int16_batch(&[1])?, &good)?;
        let catalog = crate::engine::local::read_catalog(&path)?;
        assert_eq!(catalog.database_version, 4);
        Ok(())
    }

    #[test]
    fn not_null_columns_are_enforced_and_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let options = WriteOptions::default().with_not_null(["id"]);

        let clean = batch(vec![("id", Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef)])?;
        write_batch(&path, "t", clean, &options)?;
        let back = read_table(&path, "t", &ReadOptions::default())?;
        assert!(!back.schema().field(0).is_nullable());

        let with_null = batch(vec![(
            "id",
            Arc::new(Int32Array::from(vec![Some(1), None])) as ArrayRef,
        )])?;
        let err = write_batch(&path, "t", with_null, &options).unwrap_err();
        assert!(matches!(err, Error::ValueConversion { row: 1, .. }), "{err}");
        assert!(err.to_string().contains("NOT NULL"), "{err}");
        Ok(())
    }

    #[test]
    fn json_columns_read_back_as_text() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let input = batch(vec![(
            "doc",
            Arc::new(StringArray::from(vec![r#"{"a": 1}"#])) as ArrayRef,
        )])?;
        write_batch(&path, "docs", input, &WriteOptions::default().with_json(["doc"]))?;

        let back = read_table(&path, "docs", &ReadOptions::default())?;
        assert_eq!(column(&back, "doc")?.as_string::<i32>().value(0), r#"{"a": 1}"#);

        let mut conn = LocalEngine.open(&path, OpenMode::ReadOnly, &ProcessParams::new())?;
        let def = conn
            .table_definition(&TableName::new("docs"))?
            .ok_or_else(|| anyhow::anyhow!("missing table"))?;
        assert_eq!(def.columns[0].storage_type, StorageType::Json);
        Ok(())
    }

    #[test]
    fn geo_columns_write_but_do_not_read() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let input = batch(vec![
            ("id", Arc::new(Int32Array::from(vec![1])) as ArrayRef),
            (
                "wkt",
                Arc::new(StringArray::from(vec!["POINT (1 2)"])) as ArrayRef,
            ),
        ])?;
        let options = WriteOptions::default()
            .with_geo(["wkt"])
            .with_table_mode(TableMode::Write);
        write_batch(&path, "places", input, &options)?;

        let err = read_table(&path, "places", &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { index: 1, .. }), "{err}");

        let ids = read_query(&path, r#"SELECT "id" FROM "places""#, &ReadOptions::default())?;
        assert_eq!(ids.num_rows(), 1);
        Ok(())
    }

    #[test]
    fn unsupported_arrow_type_fails_before_touching_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = db(&dir);
        let input = batch(vec![(
            "u64",
            Arc::new(arrow::array::UInt64Array::from(vec![1u64])) as ArrayRef,
        )])?;
        let err = write_batch(&path, "t", input, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }), "{err}");
        assert!(!path.exists());
        Ok(())
    }
}
