//! Variant import - loads variant axis records into a dynamic-schema table
//!
//! A run stages a delimited file into `tmp_<code>`, reshapes the destination
//! table so it carries a column for every source attribute, rewrites axis
//! attribute codes to ids and upserts rows by `code` in bounded batches.
//!
//! Storage goes through the [`RelationalStore`] trait:
//! - [`MemoryStore`] - in-process tables
//! - [`DuckDBBackend`] - embedded DuckDB (feature `duckdb-backend`)

#[cfg(feature = "cli")]
pub mod cli;
pub mod database;
pub mod error;
pub mod import;

#[cfg(feature = "duckdb-backend")]
pub use database::DuckDBBackend;
pub use database::{
    ColumnDef, ColumnType, DatabaseError, DatabaseResult, ImportConfig, MemoryStore,
    RelationalStore, Row,
};
pub use error::{ImportError, ImportResult};
pub use import::{
    AttributeRegistry, ColumnTranslator, MergeStats, RunReport, RunState, SchemaChange,
    StepResult, VariantImport,
};
