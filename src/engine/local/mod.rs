//! A single-file columnar engine: the database lives in one archive, tables
//! are loaded lazily on first touch, and nothing reaches disk until the
//! connection commits.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::{debug, info};

use super::{
    Appender, Connection, Engine, EngineError, OpenMode, ProcessParams, RowChunk, RowSet,
    TableDefinition,
};
use crate::types::{StorageType, TableName, DEFAULT_SCHEMA};

mod appender;
mod query;
pub mod storage;

pub use appender::LocalAppender;
pub use query::{LocalRowSet, DEFAULT_CHUNK_ROWS};
pub use storage::{read_catalog, Catalog, CatalogTable};

/// Highest database file version this engine can create.
pub const MAX_DATABASE_VERSION: u8 = 4;

type SettingCheck = fn(&str) -> Result<(), String>;

static KNOWN_SETTINGS: Lazy<BTreeMap<&'static str, SettingCheck>> = Lazy::new(|| {
    let mut m: BTreeMap<&'static str, SettingCheck> = BTreeMap::new();
    m.insert("default_database_version", |v| match v.parse::<u8>() {
        Ok(n) if n <= MAX_DATABASE_VERSION => Ok(()),
        _ => Err(format!("expected 0..={MAX_DATABASE_VERSION}")),
    });
    m.insert("log_config", |_| Ok(()));
    m.insert("log_dir", |_| Ok(()));
    m
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settings {
    database_version: u8,
}

fn parse_settings(params: &ProcessParams) -> Result<Settings, EngineError> {
    let mut settings = Settings {
        database_version: 2,
    };
    for (key, value) in params {
        let check = KNOWN_SETTINGS
            .get(key.as_str())
            .ok_or_else(|| EngineError::UnknownSetting(key.clone()))?;
        check(value).map_err(|reason| EngineError::InvalidSetting {
            key: key.clone(),
            value: value.clone(),
            reason,
        })?;
        if key == "default_database_version" {
            settings.database_version = value.parse().unwrap_or(settings.database_version);
        }
    }
    Ok(settings)
}

/// The bundled engine. Stateless; every `open` gets its own connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEngine;

impl Engine for LocalEngine {
    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        params: &ProcessParams,
    ) -> Result<Box<dyn Connection>, EngineError> {
        let settings = parse_settings(params)?;
        Ok(Box::new(LocalConnection::open(path, mode, settings)?))
    }
}

/// One table as the connection sees it. `rows` is `None` until loaded.
#[derive(Debug)]
pub(crate) struct TableSlot {
    pub(crate) definition: TableDefinition,
    pub(crate) rows: Option<Arc<Vec<RowChunk>>>,
    entry: Option<String>,
    pub(crate) row_count: u64,
}

#[derive(Debug)]
pub struct LocalConnection {
    path: PathBuf,
    mode: OpenMode,
    database_version: u8,
    schemas: BTreeSet<String>,
    tables: BTreeMap<TableName, TableSlot>,
    dirty: bool,
}

impl LocalConnection {
    #[tracing::instrument(level = "debug", skip(settings), fields(path = %path.display()))]
    fn open(path: &Path, mode: OpenMode, settings: Settings) -> Result<Self, EngineError> {
        let exists = path.exists();
        if mode == OpenMode::ReadOnly && !exists {
            return Err(EngineError::DatabaseNotFound(path.display().to_string()));
        }

        let load_existing =
            exists && mode != OpenMode::CreateAndReplace && !storage::is_empty_file(path)?;
        let mut conn = Self {
            path: path.to_path_buf(),
            mode,
            database_version: settings.database_version,
            schemas: BTreeSet::from([DEFAULT_SCHEMA.to_string()]),
            tables: BTreeMap::new(),
            dirty: !load_existing && mode != OpenMode::ReadOnly,
        };
        if load_existing {
            let catalog = storage::read_catalog(path)?;
            conn.database_version = catalog.database_version;
            conn.schemas.extend(catalog.schemas);
            for table in catalog.tables {
                let name = TableName::with_schema(table.schema, table.name);
                conn.tables.insert(
                    name.clone(),
                    TableSlot {
                        definition: TableDefinition::new(name, table.columns),
                        rows: None,
                        entry: Some(table.entry),
                        row_count: table.row_count,
                    },
                );
            }
        }
        debug!(tables = conn.tables.len(), version = conn.database_version, "opened");
        Ok(conn)
    }

    fn ensure_writable(&self) -> Result<(), EngineError> {
        if self.mode == OpenMode::ReadOnly {
            return Err(EngineError::ReadOnly(self.path.display().to_string()));
        }
        Ok(())
    }

    fn load_rows(&mut self, table: &TableName) -> Result<Arc<Vec<RowChunk>>, EngineError> {
        let slot = self
            .tables
            .get_mut(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_sql()))?;
        if let Some(rows) = &slot.rows {
            return Ok(Arc::clone(rows));
        }
        let rows = match &slot.entry {
            Some(entry) => {
                storage::read_rows(&self.path, entry, slot.definition.columns.len())?
            }
            None => Vec::new(),
        };
        let rows = Arc::new(rows);
        slot.rows = Some(Arc::clone(&rows));
        Ok(rows)
    }

    /// Definition and rows of a table, for queries.
    pub(crate) fn scan(
        &mut self,
        table: &TableName,
    ) -> Result<(TableDefinition, Arc<Vec<RowChunk>>), EngineError> {
        let rows = self.load_rows(table)?;
        let def = self
            .tables
            .get(table)
            .map(|slot| slot.definition.clone())
            .ok_or_else(|| EngineError::TableNotFound(table.to_sql()))?;
        Ok((def, rows))
    }
}

/// Whether a value of `insert` may be appended into a column of `column`.
fn insert_castable(insert: &StorageType, column: &StorageType) -> bool {
    insert == column
        || matches!(
            (insert, column),
            (StorageType::Text | StorageType::Bytes, StorageType::Geography)
                | (StorageType::Text, StorageType::Json)
                | (StorageType::Text, StorageType::Varchar(_))
                | (StorageType::Text, StorageType::Char(_))
        )
}

impl Connection for LocalConnection {
    fn create_schema_if_not_exists(&mut self, schema: &str) -> Result<(), EngineError> {
        if self.schemas.contains(schema) {
            return Ok(());
        }
        self.ensure_writable()?;
        self.schemas.insert(schema.to_string());
        self.dirty = true;
        Ok(())
    }

    fn table_definition(
        &mut self,
        table: &TableName,
    ) -> Result<Option<TableDefinition>, EngineError> {
        Ok(self.tables.get(table).map(|slot| slot.definition.clone()))
    }

    fn create_table(
        &mut self,
        definition: &TableDefinition,
        replace: bool,
    ) -> Result<(), EngineError> {
        self.ensure_writable()?;
        let name = &definition.name;
        if !self.schemas.contains(name.schema()) {
            return Err(EngineError::SchemaNotFound(name.schema().to_string()));
        }
        if self.tables.contains_key(name) && !replace {
            return Err(EngineError::TableExists(name.to_sql()));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = definition.columns.iter().find(|c| !seen.insert(&c.name)) {
            return Err(EngineError::Query(format!(
                "column \"{}\" specified more than once",
                dup.name
            )));
        }
        self.tables.insert(
            name.clone(),
            TableSlot {
                definition: definition.clone(),
                rows: Some(Arc::new(Vec::new())),
                entry: None,
                row_count: 0,
            },
        );
        self.dirty = true;
        debug!(table = %name, replace, "table created");
        Ok(())
    }

    fn appender<'c>(
        &'c mut self,
        table: &TableName,
        insert_types: &[StorageType],
    ) -> Result<Box<dyn Appender + 'c>, EngineError> {
        self.ensure_writable()?;
        self.load_rows(table)?;
        let slot = self
            .tables
            .get_mut(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_sql()))?;

        let columns = &slot.definition.columns;
        if columns.len() != insert_types.len() {
            return Err(EngineError::Append(format!(
                "table has {} columns, {} insert types given",
                columns.len(),
                insert_types.len()
            )));
        }
        if let Some((col, insert)) = columns
            .iter()
            .zip(insert_types)
            .find(|(col, insert)| !insert_castable(insert, &col.storage_type))
        {
            return Err(EngineError::Append(format!(
                "cannot insert {insert} into column '{}' of type {}",
                col.name, col.storage_type
            )));
        }

        self.dirty = true;
        Ok(Box::new(LocalAppender::new(slot, insert_types.to_vec())))
    }

    fn execute_query(
        &mut self,
        query: &str,
        chunk_size: Option<usize>,
    ) -> Result<Box<dyn RowSet>, EngineError> {
        Ok(Box::new(query::execute(self, query, chunk_size)?))
    }

    fn list_tables(&mut self) -> Result<Vec<TableName>, EngineError> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn commit(mut self: Box<Self>) -> Result<(), EngineError> {
        if self.mode == OpenMode::ReadOnly || !self.dirty {
            return Ok(());
        }

        // 1) Pull every table into memory; the file is about to be replaced.
        let names: Vec<TableName> = self.tables.keys().cloned().collect();
        let mut loaded = Vec::with_capacity(names.len());
        for name in &names {
            loaded.push(self.load_rows(name)?);
        }

        // 2) Fresh catalog with sequential entry names.
        let entries: Vec<String> = (0..names.len()).map(|i| format!("tables/{i}.bin")).collect();
        let catalog = Catalog {
            format_version: storage::FORMAT_VERSION,
            database_version: self.database_version,
            schemas: self.schemas.iter().cloned().collect(),
            tables: self
                .tables
                .values()
                .zip(&entries)
                .map(|(slot, entry)| CatalogTable {
                    schema: slot.definition.name.schema().to_string(),
                    name: slot.definition.name.name().to_string(),
                    columns: slot.definition.columns.clone(),
                    row_count: slot.row_count,
                    entry: entry.clone(),
                })
                .collect(),
        };

        // 3) Write it all out.
        let data: Vec<storage::TableData<'_>> = self
            .tables
            .values()
            .zip(&entries)
            .zip(&loaded)
            .map(|((slot, entry), rows)| storage::TableData {
                entry,
                num_columns: slot.definition.columns.len(),
                chunks: rows.as_slice(),
            })
            .collect();
        storage::write_database(&self.path, &catalog, &data)?;
        info!(path = %self.path.display(), tables = names.len(), "committed");
        Ok(())
    }
}
