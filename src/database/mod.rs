//! Relational store abstraction for the variant import
//!
//! This module provides the table-level capability the importer consumes:
//! - DuckDB: Embedded database for the CLI and for file-backed runs
//! - Memory: In-process tables for tests and dry runs
//!
//! The importer never issues SQL of its own. Everything it needs (describe,
//! create, add/drop column, scan, upsert) goes through [`RelationalStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Re-export implementations based on features
#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

pub mod config;
pub mod memory;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBBackend;

pub use config::ImportConfig;
pub use memory::MemoryStore;

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Column add/drop rejected by the store
    #[error("Schema change failed: {0}")]
    SchemaChangeFailed(String),

    /// Batch upsert rejected by the store
    #[error("Upsert failed: {0}")]
    UpsertFailed(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Column storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Unbounded free text
    Text,
    /// Bounded character column
    Varchar(u32),
}

impl ColumnType {
    /// SQL type name
    pub fn sql_name(&self) -> String {
        match self {
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Varchar(len) => format!("VARCHAR({})", len),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Column definition used for table creation and column adds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Storage type
    pub column_type: ColumnType,
}

impl ColumnDef {
    /// Free-text column
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
        }
    }

    /// Bounded character column
    pub fn varchar(name: impl Into<String>, len: u32) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Varchar(len),
        }
    }
}

/// A single table row: column names paired with nullable text values,
/// in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    fields: Vec<(String, Option<String>)>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, column: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.set(column, value.map(Into::into));
        self
    }

    /// Set a column value, replacing any previous value for that column
    pub fn set(&mut self, column: impl Into<String>, value: Option<String>) {
        let column = column.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(field) => field.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Value of a column; NULL and missing both read as `None`
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Whether the row carries the column at all (even as NULL)
    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over `(column, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, Option<String>)>>(iter: T) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

/// Relational store capability consumed by the importer
///
/// All operations are async to match the rest of the backend layer; the
/// importer awaits them strictly one after another.
#[async_trait(?Send)]
pub trait RelationalStore: Send + Sync {
    /// Check whether a table exists
    async fn table_exists(&self, table: &str) -> DatabaseResult<bool>;

    /// Ordered column names of a table
    ///
    /// # Returns
    /// `TableNotFound` if the table does not exist
    async fn describe_table(&self, table: &str) -> DatabaseResult<Vec<String>>;

    /// Create a table
    ///
    /// # Arguments
    /// * `table` - Table name
    /// * `columns` - Column definitions, in order
    /// * `if_not_exists` - Succeed silently when the table already exists
    async fn create_table(
        &self,
        table: &str,
        columns: &[ColumnDef],
        if_not_exists: bool,
    ) -> DatabaseResult<()>;

    /// Drop a table; no error if it is already absent
    async fn drop_table(&self, table: &str) -> DatabaseResult<()>;

    /// Check whether a table has a column
    async fn column_exists(&self, table: &str, column: &str) -> DatabaseResult<bool>;

    /// Add a column; no-op if the column already exists
    async fn add_column(&self, table: &str, column: &ColumnDef) -> DatabaseResult<()>;

    /// Drop a column; no-op if the column is already absent
    async fn drop_column(&self, table: &str, column: &str) -> DatabaseResult<()>;

    /// Append rows
    ///
    /// # Returns
    /// Number of rows inserted
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> DatabaseResult<usize>;

    /// Read a page of rows in insertion order
    ///
    /// # Arguments
    /// * `offset` - Number of rows to skip
    /// * `limit` - Maximum number of rows to return
    async fn scan_rows(&self, table: &str, offset: usize, limit: usize)
    -> DatabaseResult<Vec<Row>>;

    /// Insert rows whose key is new and overwrite the supplied columns of rows
    /// whose key already exists. One call is one transaction.
    ///
    /// # Returns
    /// Number of rows written
    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[Row],
        key_columns: &[String],
    ) -> DatabaseResult<usize>;

    /// Fetch `(key, value)` pairs from two columns of a table
    ///
    /// # Arguments
    /// * `filter` - Optional `(column, value)` equality filter
    async fn select_pairs(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        filter: Option<(&str, &str)>,
    ) -> DatabaseResult<Vec<(String, String)>>;

    /// Get the database backend type name
    ///
    /// # Returns
    /// Backend type string ("duckdb" or "memory")
    fn backend_type(&self) -> &'static str;
}

/// Quote an identifier for SQL, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
