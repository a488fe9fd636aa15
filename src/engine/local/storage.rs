//! On-disk layout of a local database: a zip archive holding `catalog.json`
//! and one binary entry per table.
//!
//! A table entry is `TCT1`, the column count (u32), the row count (u64), then
//! every cell row-major as a u32 length followed by that many bytes. A length
//! of `u32::MAX` marks a null.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::engine::{ColumnDefinition, EngineError, RowChunk};

pub const CATALOG_ENTRY: &str = "catalog.json";
pub const FORMAT_VERSION: u32 = 1;
/// Rows per chunk when table data is loaded or appended.
pub const CHUNK_ROWS: usize = 8192;

const TABLE_MAGIC: &[u8; 4] = b"TCT1";
const NULL_MARKER: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub format_version: u32,
    pub database_version: u8,
    pub schemas: Vec<String>,
    pub tables: Vec<CatalogTable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTable {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub row_count: u64,
    /// Archive entry holding the rows.
    pub entry: String,
}

/// Rows of one table, ready to be written under `entry`.
#[derive(Clone, Copy)]
pub struct TableData<'a> {
    pub entry: &'a str,
    pub num_columns: usize,
    pub chunks: &'a [RowChunk],
}

fn corrupt(path: &Path, message: impl Into<String>) -> EngineError {
    EngineError::Corrupt {
        path: path.display().to_string(),
        message: message.into(),
    }
}

/// A zero-length file counts as an empty database; that is what a freshly
/// staged temporary file looks like.
pub fn is_empty_file(path: &Path) -> Result<bool, EngineError> {
    Ok(std::fs::metadata(path)?.len() == 0)
}

#[tracing::instrument(level = "debug", fields(path = %path.display()))]
pub fn read_catalog(path: &Path) -> Result<Catalog, EngineError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let entry = archive
        .by_name(CATALOG_ENTRY)
        .map_err(|_| corrupt(path, "missing catalog"))?;
    let catalog: Catalog = serde_json::from_reader(entry)?;
    if catalog.format_version != FORMAT_VERSION {
        return Err(corrupt(
            path,
            format!("unsupported format version {}", catalog.format_version),
        ));
    }
    debug!(tables = catalog.tables.len(), "catalog loaded");
    Ok(catalog)
}

#[tracing::instrument(level = "debug", fields(path = %path.display(), entry = %entry))]
pub fn read_rows(
    path: &Path,
    entry: &str,
    num_columns: usize,
) -> Result<Vec<RowChunk>, EngineError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let mut zipped = archive
        .by_name(entry)
        .map_err(|_| corrupt(path, format!("missing table entry {entry}")))?;
    let mut buf = Vec::with_capacity(zipped.size() as usize);
    zipped.read_to_end(&mut buf)?;
    decode_rows(&buf, num_columns).map_err(|msg| corrupt(path, format!("{entry}: {msg}")))
}

/// Write the whole database to `path`, replacing whatever is there.
///
/// The archive is built in a temporary file beside `path` and renamed over
/// it once complete, so a failure part way leaves the old file intact.
#[tracing::instrument(level = "debug", skip(catalog, tables), fields(path = %path.display()))]
pub fn write_database(
    path: &Path,
    catalog: &Catalog,
    tables: &[TableData<'_>],
) -> Result<(), EngineError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".tabcodec.")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    let mut zip = ZipWriter::new(BufWriter::new(temp));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // 1) Catalog first, then one entry per table.
    zip.start_file(CATALOG_ENTRY, options)?;
    serde_json::to_writer_pretty(&mut zip, catalog)?;

    for table in tables {
        zip.start_file(table.entry, options)?;
        zip.write_all(&encode_rows(table.chunks, table.num_columns))?;
    }

    // 2) Flush to disk, then swap it in.
    let temp = zip.finish()?.into_inner().map_err(|e| e.into_error())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| EngineError::Io(e.error))?;
    debug!(tables = tables.len(), "database written");
    Ok(())
}

fn encode_rows(chunks: &[RowChunk], num_columns: usize) -> Vec<u8> {
    let num_rows: usize = chunks.iter().map(RowChunk::num_rows).sum();
    let mut out = Vec::new();
    out.extend_from_slice(TABLE_MAGIC);
    out.extend_from_slice(&(num_columns as u32).to_le_bytes());
    out.extend_from_slice(&(num_rows as u64).to_le_bytes());
    for chunk in chunks {
        for row in 0..chunk.num_rows() {
            for cell in chunk.row(row) {
                match cell {
                    Some(bytes) => {
                        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                        out.extend_from_slice(bytes);
                    }
                    None => out.extend_from_slice(&NULL_MARKER.to_le_bytes()),
                }
            }
        }
    }
    out
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| format!("truncated at byte {}", self.pos))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, String> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, String> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }
}

fn decode_rows(buf: &[u8], num_columns: usize) -> Result<Vec<RowChunk>, String> {
    let mut cur = Cursor { buf, pos: 0 };
    if cur.take(4)? != TABLE_MAGIC {
        return Err("bad magic".into());
    }
    let stored_columns = cur.u32()? as usize;
    if stored_columns != num_columns {
        return Err(format!(
            "catalog has {num_columns} columns, entry has {stored_columns}"
        ));
    }
    let num_rows = cur.u64()?;

    let mut chunks = Vec::new();
    let mut current = RowChunk::new(num_columns);
    for _ in 0..num_rows {
        for _ in 0..num_columns {
            match cur.u32()? {
                NULL_MARKER => current.push_null(),
                len => current.push_value(cur.take(len as usize)?),
            }
        }
        current.end_row();
        if current.num_rows() == CHUNK_ROWS {
            chunks.push(std::mem::replace(&mut current, RowChunk::new(num_columns)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if cur.pos != buf.len() {
        return Err(format!("{} trailing bytes", buf.len() - cur.pos));
    }
    Ok(chunks)
}
