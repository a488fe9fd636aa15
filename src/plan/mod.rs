//! Column plans: the per-column decisions made once before any data moves.

use arrow::datatypes::{Field, Schema, SchemaRef};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::Codec;
use crate::engine::{ColumnDefinition, TableDefinition};
use crate::error::{CellLocation, Direction, Error, Result};
use crate::types::{to_logical, to_storage, LogicalType, StorageType, TableName};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub index: usize,
    pub name: String,
    pub logical_type: LogicalType,
    /// Type of the table column.
    pub storage_type: StorageType,
    /// Type values are appended as; differs from `storage_type` only where
    /// the engine casts on insert.
    pub insert_type: StorageType,
    pub nullable: bool,
    pub codec: Codec,
}

impl ColumnPlan {
    pub fn column_definition(&self) -> ColumnDefinition {
        ColumnDefinition::new(self.name.clone(), self.storage_type, self.nullable)
    }

    pub fn field(&self) -> Field {
        Field::new(&self.name, self.logical_type.to_arrow(), self.nullable)
    }

    /// Location of a cell being written (Arrow -> engine).
    pub fn write_location(&self, row: usize) -> CellLocation<'_> {
        CellLocation {
            row,
            column: self.index,
            name: &self.name,
            source_type: self.logical_type.to_string(),
            target_type: self.storage_type.to_string(),
        }
    }

    /// Location of a cell being read (engine -> Arrow).
    pub fn read_location(&self, row: usize) -> CellLocation<'_> {
        CellLocation {
            row,
            column: self.index,
            name: &self.name,
            source_type: self.storage_type.to_string(),
            target_type: self.logical_type.to_string(),
        }
    }
}

/// Per-column overrides applied on the write path, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOptions {
    pub not_null: BTreeSet<String>,
    pub json: BTreeSet<String>,
    pub geo: BTreeSet<String>,
}

fn unsupported(direction: Direction, index: usize, name: &str, type_name: String) -> Error {
    Error::UnsupportedType {
        direction,
        column: name.to_string(),
        index,
        type_name,
    }
}

/// Plan every column of an incoming Arrow schema.
///
/// Columns default to nullable regardless of the Arrow field; only
/// `not_null` makes a column NOT NULL.
#[tracing::instrument(level = "debug", skip_all, fields(columns = schema.fields().len()))]
pub fn plan_write(schema: &Schema, options: &ColumnOptions) -> Result<Vec<ColumnPlan>> {
    // 1) Duplicate names are fatal; report every offender.
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for field in schema.fields() {
        *counts.entry(field.name().as_str()).or_default() += 1;
    }
    let dups: Vec<(usize, String)> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| counts[f.name().as_str()] > 1)
        .map(|(i, f)| (i, f.name().clone()))
        .collect();
    if !dups.is_empty() {
        return Err(Error::DuplicateColumns(dups));
    }

    // 2) Overrides naming columns that are not there are ignored.
    for (kind, names) in [
        ("not_null", &options.not_null),
        ("json", &options.json),
        ("geo", &options.geo),
    ] {
        for name in names.iter().filter(|n| !counts.contains_key(n.as_str())) {
            warn!(option = kind, column = %name, "column option names no such column");
        }
    }

    // 3) Map each column.
    let mut plans = Vec::with_capacity(schema.fields().len());
    for (index, field) in schema.fields().iter().enumerate() {
        let name = field.name();
        let logical = LogicalType::from(field.data_type());

        let (storage_type, insert_type) = if options.geo.contains(name) {
            if logical.is_text() {
                (StorageType::Geography, StorageType::Text)
            } else if logical.is_binary() {
                (StorageType::Geography, StorageType::Bytes)
            } else {
                return Err(unsupported(
                    Direction::Arrow,
                    index,
                    name,
                    format!("{logical} (as GEOGRAPHY)"),
                ));
            }
        } else if options.json.contains(name) {
            if !logical.is_text() {
                return Err(unsupported(
                    Direction::Arrow,
                    index,
                    name,
                    format!("{logical} (as JSON)"),
                ));
            }
            (StorageType::Json, StorageType::Json)
        } else {
            let st = to_storage(&logical)
                .ok_or_else(|| unsupported(Direction::Arrow, index, name, logical.to_string()))?;
            (st, st)
        };

        plans.push(ColumnPlan {
            index,
            name: name.clone(),
            codec: Codec::for_storage(&insert_type),
            logical_type: logical,
            storage_type,
            insert_type,
            nullable: !options.not_null.contains(name),
        });
    }
    debug!(?plans, "write plan built");
    Ok(plans)
}

/// Plan every column of a query result, renaming duplicates.
pub fn plan_read(columns: &[ColumnDefinition]) -> Result<Vec<ColumnPlan>> {
    let names = dedupe_names(columns.iter().map(|c| c.name.as_str()));
    columns
        .iter()
        .zip(names)
        .enumerate()
        .map(|(index, (col, name))| {
            let logical = to_logical(&col.storage_type).ok_or_else(|| {
                unsupported(Direction::Engine, index, &col.name, col.storage_type.to_string())
            })?;
            Ok(ColumnPlan {
                index,
                name,
                logical_type: logical,
                storage_type: col.storage_type,
                insert_type: col.storage_type,
                nullable: col.nullable,
                codec: Codec::for_storage(&col.storage_type),
            })
        })
        .collect()
}

/// Give repeated names `_1`, `_2`, ... suffixes, skipping any suffix that
/// would collide with a name already taken.
pub fn dedupe_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.to_string();
        let mut suffix = 0;
        while taken.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}_{suffix}");
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

pub fn table_definition(table: &TableName, plans: &[ColumnPlan]) -> TableDefinition {
    TableDefinition::new(
        table.clone(),
        plans.iter().map(ColumnPlan::column_definition).collect(),
    )
}

/// Arrow schema produced by a read plan.
pub fn arrow_schema(plans: &[ColumnPlan]) -> SchemaRef {
    Arc::new(Schema::new(
        plans.iter().map(ColumnPlan::field).collect::<Vec<_>>(),
    ))
}
