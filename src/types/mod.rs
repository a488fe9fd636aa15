pub mod logical;
pub mod mapping;
pub mod name;
pub mod storage;

pub use logical::{Layout, LogicalType};
pub use mapping::{to_logical, to_storage};
pub use name::{escape_identifier, escape_string_literal, TableName, DEFAULT_SCHEMA};
pub use storage::StorageType;
