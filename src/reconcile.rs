//! Append-mode check that a planned table matches the one already stored.

use thiserror::Error;

use crate::engine::ColumnDefinition;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaMismatch {
    #[error(
        "Number of columns in new table definition does not match existing: new has {new_count} {new}, existing has {old_count} {old}"
    )]
    ColumnCount {
        new_count: usize,
        old_count: usize,
        new: String,
        old: String,
    },

    #[error(
        "Mismatched column definitions at index {index}; new: {new_column} old: {old_column}; new table: {new} existing table: {old}"
    )]
    Column {
        index: usize,
        new_column: String,
        old_column: String,
        new: String,
        old: String,
    },
}

fn describe(columns: &[ColumnDefinition]) -> String {
    let inner: Vec<String> = columns.iter().map(ToString::to_string).collect();
    format!("[{}]", inner.join(", "))
}

/// Compare position by position: names and nullability must match exactly;
/// types must match except that TEXT may go into VARCHAR/CHAR.
pub fn reconcile(
    planned: &[ColumnDefinition],
    existing: &[ColumnDefinition],
) -> Result<(), SchemaMismatch> {
    if planned.len() != existing.len() {
        return Err(SchemaMismatch::ColumnCount {
            new_count: planned.len(),
            old_count: existing.len(),
            new: describe(planned),
            old: describe(existing),
        });
    }
    for (index, (new, old)) in planned.iter().zip(existing).enumerate() {
        let same = new.name == old.name
            && new.nullable == old.nullable
            && new.storage_type.is_compatible_with(&old.storage_type);
        if !same {
            return Err(SchemaMismatch::Column {
                index,
                new_column: new.to_string(),
                old_column: old.to_string(),
                new: describe(planned),
                old: describe(existing),
            });
        }
    }
    Ok(())
}
