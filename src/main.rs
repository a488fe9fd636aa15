use anyhow::{bail, Context, Result};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::util::pretty::print_batches;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::io::Seek;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, process::exit};
use tabcodec::{BatchStream, BoxedReader, ReadOptions, TableMode, TableName, WriteOptions};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "Usage:
  tabcodec tables <DB>
  tabcodec show   <DB> <TABLE | --query SQL> [--chunk-size N]
  tabcodec import <DB> <GLOB> [--table T] [--append] [--options FILE]
  tabcodec export <DB> <TABLE> <OUT.parquet>";

/// Rows sampled from a CSV file to infer its schema.
const CSV_INFER_ROWS: usize = 1000;

fn main() {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) dispatch ─────────────────────────────────────────────────
    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let (positional, flags) = split_flags(args);
    match positional.as_slice() {
        ["tables", db] => tables(Path::new(db)),
        ["show", db, rest @ ..] if rest.len() <= 1 => {
            let mut options = ReadOptions::default();
            if let Some(n) = flag_value(&flags, "--chunk-size") {
                options = options.with_chunk_size(n.parse().context("--chunk-size")?);
            }
            let stream = match (rest, flag_value(&flags, "--query")) {
                ([table], None) => tabcodec::stream_table(db, *table, &options)?,
                ([], Some(query)) => tabcodec::stream_query(db, query, &options)?,
                _ => bail!("show takes either a table or --query\n{USAGE}"),
            };
            show(stream)
        }
        ["import", db, pattern] => {
            let mut options = match flag_value(&flags, "--options") {
                Some(file) => WriteOptions::from_file(file)?,
                None => WriteOptions::default(),
            };
            if flags.iter().any(|f| f == "--append") {
                options = options.with_table_mode(TableMode::Append);
            }
            let files = expand(pattern)?;
            match flag_value(&flags, "--table") {
                Some(table) => import_into(Path::new(db), TableName::from(table), &files, options),
                None => import_by_stem(Path::new(db), &files, &options),
            }
        }
        ["export", db, table, out] => {
            export(Path::new(db), TableName::from(*table), Path::new(out))
        }
        _ => {
            eprintln!("{USAGE}");
            exit(2);
        }
    }
}

/// Separate `--flag [value]` pairs from positional arguments.
fn split_flags(args: &[String]) -> (Vec<&str>, Vec<String>) {
    let mut positional = Vec::new();
    let mut flags = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--append" {
            flags.push(arg.clone());
        } else if arg.starts_with("--") {
            flags.push(arg.clone());
            if let Some(value) = iter.next() {
                flags.push(value.clone());
            }
        } else {
            positional.push(arg.as_str());
        }
    }
    (positional, flags)
}

fn flag_value<'a>(flags: &'a [String], name: &str) -> Option<&'a str> {
    flags
        .iter()
        .position(|f| f == name)
        .and_then(|i| flags.get(i + 1))
        .map(String::as_str)
}

fn tables(db: &Path) -> Result<()> {
    for table in tabcodec::list_tables(db, &ReadOptions::default())? {
        println!("{}", table.to_sql());
    }
    Ok(())
}

fn show(stream: BatchStream) -> Result<()> {
    let mut rows = 0;
    for batch in stream {
        let batch = batch?;
        rows += batch.num_rows();
        print_batches(&[batch])?;
    }
    info!(rows, "shown");
    Ok(())
}

fn open_source(path: &Path) -> Result<BoxedReader<'static>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("parquet") => {
            let file = File::open(path)?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
            Ok(Box::new(reader))
        }
        Some("csv") => {
            let mut file = File::open(path)?;
            let format = Format::default().with_header(true);
            let (schema, _) = format.infer_schema(&mut file, Some(CSV_INFER_ROWS))?;
            file.rewind()?;
            let reader = ReaderBuilder::new(Arc::new(schema))
                .with_format(format)
                .build(file)?;
            Ok(Box::new(reader))
        }
        _ => bail!("{}: expected a .csv or .parquet file", path.display()),
    }
}

fn expand(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob::glob(pattern)?.collect::<Result<_, _>>()?;
    files.sort();
    if files.is_empty() {
        bail!("no files match {pattern}");
    }
    Ok(files)
}

/// Load every file into `table`. The first file honours the requested mode;
/// later files append to it.
fn import_into(
    db: &Path,
    table: TableName,
    files: &[PathBuf],
    options: WriteOptions,
) -> Result<()> {
    let mut options = options;
    let mut total = 0;
    for file in files {
        let source = open_source(file)?;
        let written = tabcodec::write_tables(db, [(table.clone(), source)], &options)
            .with_context(|| format!("importing {}", file.display()))?;
        let rows = written.get(&table).copied().unwrap_or(0);
        info!(file = %file.display(), rows, "imported");
        total += rows;
        options = options.with_table_mode(TableMode::Append);
    }
    println!("{total} rows from {} file(s) into {}", files.len(), table.to_sql());
    Ok(())
}

/// Load each file into a table named after its stem, all in one write.
fn import_by_stem(db: &Path, files: &[PathBuf], options: &WriteOptions) -> Result<()> {
    let mut sources = Vec::with_capacity(files.len());
    for file in files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", file.display()))?;
        sources.push((TableName::new(stem), open_source(file)?));
    }
    let written = tabcodec::write_tables(db, sources, options)?;
    for (table, rows) in &written {
        println!("{rows} rows into {}", table.to_sql());
    }
    Ok(())
}

fn export(db: &Path, table: TableName, out: &Path) -> Result<()> {
    let stream = tabcodec::stream_table(db, &table, &ReadOptions::default())?;
    let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    let mut writer = ArrowWriter::try_new(file, stream.schema(), None)?;
    let mut rows = 0;
    for batch in stream {
        let batch = batch?;
        rows += batch.num_rows();
        writer.write(&batch)?;
    }
    writer.close()?;
    println!("{rows} rows from {} written to {}", table.to_sql(), out.display());
    Ok(())
}
