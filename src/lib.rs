//! Columnar transfer between Arrow record batches and a tabular database
//! engine.
//!
//! Writes plan each Arrow column onto an engine storage type, reconcile with
//! any existing table, and stream rows through the engine's appender. Reads
//! run a query and decode the engine's row chunks back into Arrow batches.

pub mod api;
pub mod atomic;
pub mod codec;
pub mod engine;
pub mod error;
pub mod options;
pub mod plan;
pub mod reader;
pub mod reconcile;
pub mod types;
pub mod writer;

pub use api::{
    list_tables, read_query, read_table, read_tables, stream_query, stream_table, write_batch,
    write_table, write_tables, BoxedReader, Store,
};
pub use engine::{Engine, LocalEngine};
pub use error::{Error, Result};
pub use options::{ReadOptions, TableMode, WriteOptions};
pub use reader::BatchStream;
pub use types::{StorageType, TableName};
