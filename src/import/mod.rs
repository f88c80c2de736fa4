//! Variant import
//!
//! Stages a delimited source file, evolves the destination schema to match
//! its columns and merges its rows in bounded batches:
//! - `source` - delimited file reader
//! - `translator` - source to destination column naming
//! - `staging` - ephemeral staging table
//! - `attributes` - attribute code to id registry
//! - `schema` - column diff planning and application
//! - `merge` - batched upsert into the destination
//! - `pipeline` - the ordered run

pub mod attributes;
pub mod merge;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod staging;
pub mod translator;

pub use attributes::AttributeRegistry;
pub use merge::{DEFAULT_BATCH_SIZE, MergeEngine, MergeStats, resolve_axis};
pub use pipeline::{RunReport, RunState, StepLog, StepResult, VariantImport};
pub use schema::{SchemaChange, SchemaReconciler, plan_add, plan_drop};
pub use source::{SourceFormat, TabularSource};
pub use staging::StagingStore;
pub use translator::{ColumnRenameRule, ColumnTranslator};
