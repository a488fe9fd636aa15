use std::{env, path::Path, process::exit};
use tabcodec::engine::local::{read_catalog, Catalog};
use tabcodec::TableName;

fn main() {
    // Expect exactly one CLI argument: path to a database file.
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <DB_FILE>", args[0]);
        exit(1);
    }
    let path = Path::new(&args[1]);
    match read_catalog(path) {
        Ok(catalog) => print_catalog(path, &catalog),
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    }
}

/// Print the file header, then every table with its columns.
fn print_catalog(path: &Path, catalog: &Catalog) {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    // 1) File-level details
    println!("=== Database: {} ===", path.display());
    println!("Format version:   {}", catalog.format_version);
    println!("Database version: {}", catalog.database_version);
    println!("Schemas:          {}", catalog.schemas.join(", "));
    println!("Tables:           {}", catalog.tables.len());
    println!("Size on disk:     {} bytes", size);
    println!();

    // 2) Per-table details
    for table in &catalog.tables {
        let name = TableName::from((table.schema.as_str(), table.name.as_str()));
        println!("--- {} ({} rows, entry {}) ---", name, table.row_count, table.entry);
        for col in &table.columns {
            println!(
                "- {:<30} | {:<14} | {}",
                col.name,
                col.storage_type.to_string(),
                if col.nullable { "NULL" } else { "NOT NULL" }
            );
        }
        println!();
    }
}
