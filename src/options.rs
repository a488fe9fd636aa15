//! Caller-facing knobs for the write and read paths. Both option sets are
//! plain serde structs, so they can also come from a YAML or JSON file.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::engine::ProcessParams;
use crate::error::{Error, Result};
use crate::plan::ColumnOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum TableMode {
    /// Recreate the table from scratch. Only the named table is dropped;
    /// every other table in the file is kept as it was.
    #[default]
    #[serde(rename = "w")]
    Write,
    /// Add rows to the table, creating it if missing.
    #[serde(rename = "a")]
    Append,
}

impl FromStr for TableMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "w" => Ok(TableMode::Write),
            "a" => Ok(TableMode::Append),
            other => Err(Error::InvalidTableMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for TableMode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for TableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableMode::Write => "w",
            TableMode::Append => "a",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteOptions {
    pub table_mode: TableMode,
    pub not_null_columns: BTreeSet<String>,
    pub json_columns: BTreeSet<String>,
    pub geo_columns: BTreeSet<String>,
    pub process_params: ProcessParams,
    /// Stage the whole write in a temporary file beside the destination and
    /// move it into place only on success. Turning this off skips the copy;
    /// the engine's own commit still swaps the file in atomically.
    pub atomic: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            table_mode: TableMode::Write,
            not_null_columns: BTreeSet::new(),
            json_columns: BTreeSet::new(),
            geo_columns: BTreeSet::new(),
            process_params: ProcessParams::new(),
            atomic: true,
        }
    }
}

fn names<I, S>(cols: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    cols.into_iter().map(Into::into)
}

impl WriteOptions {
    pub fn append() -> Self {
        Self {
            table_mode: TableMode::Append,
            ..Self::default()
        }
    }

    pub fn with_table_mode(mut self, mode: TableMode) -> Self {
        self.table_mode = mode;
        self
    }

    pub fn with_not_null<I: IntoIterator<Item = S>, S: Into<String>>(mut self, cols: I) -> Self {
        self.not_null_columns.extend(names(cols));
        self
    }

    pub fn with_json<I: IntoIterator<Item = S>, S: Into<String>>(mut self, cols: I) -> Self {
        self.json_columns.extend(names(cols));
        self
    }

    pub fn with_geo<I: IntoIterator<Item = S>, S: Into<String>>(mut self, cols: I) -> Self {
        self.geo_columns.extend(names(cols));
        self
    }

    pub fn with_process_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.process_params.insert(key.into(), value.into());
        self
    }

    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn column_options(&self) -> ColumnOptions {
        ColumnOptions {
            not_null: self.not_null_columns.clone(),
            json: self.json_columns.clone(),
            geo: self.geo_columns.clone(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load(path.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadOptions {
    /// Rows per streamed batch; `None` leaves it to the engine.
    pub chunk_size: Option<usize>,
    pub process_params: ProcessParams,
}

impl ReadOptions {
    pub fn with_chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    pub fn with_process_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.process_params.insert(key.into(), value.into());
        self
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load(path.as_ref())
    }
}

/// `.json` files parse as JSON, anything else as YAML.
fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let config_err = |message: String| Error::Config {
        path: path.display().to_string(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&text).map_err(|e| config_err(e.to_string()))
    } else {
        serde_yaml::from_str(&text).map_err(|e| config_err(e.to_string()))
    }
}
