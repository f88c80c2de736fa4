//! DuckDB database backend implementation
//!
//! Provides an embedded database backend using DuckDB for staging and
//! destination tables of the variant import.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{ColumnDef, DatabaseError, DatabaseResult, RelationalStore, Row, quote_identifier};

/// DuckDB database backend
///
/// Supports both file-based persistence and in-memory mode.
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDBBackend {
    /// Create a new DuckDB backend with a file-based database
    ///
    /// # Arguments
    /// * `db_path` - Path to the DuckDB database file
    ///
    /// # Returns
    /// A new DuckDB backend instance
    pub fn new(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory DuckDB backend
    ///
    /// Useful for testing or dry runs where persistence is not needed.
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> DatabaseResult<MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Execute a SQL statement that doesn't return rows
    fn execute(&self, sql: &str) -> DatabaseResult<usize> {
        let conn = self.lock()?;
        conn.execute(sql, [])
            .map_err(|e| DatabaseError::QueryFailed(format!("Execute failed: {}", e)))
    }

    fn table_exists_locked(conn: &duckdb::Connection, table: &str) -> DatabaseResult<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
                [table],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(format!("Table lookup failed: {}", e)))?;
        Ok(count > 0)
    }

    fn columns_locked(conn: &duckdb::Connection, table: &str) -> DatabaseResult<Vec<String>> {
        let mut stmt = conn
            .prepare(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_name = ? ORDER BY ordinal_position",
            )
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))
            .map_err(|e| DatabaseError::QueryFailed(format!("Describe failed: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?;

        if columns.is_empty() && !Self::table_exists_locked(conn, table)? {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }
        Ok(columns)
    }

    /// Insert a single row through a cached prepared statement
    fn insert_locked(conn: &duckdb::Connection, table: &str, row: &Row) -> duckdb::Result<usize> {
        let columns: Vec<String> = row.columns().map(quote_identifier).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            columns.join(", "),
            placeholders
        );
        let values: Vec<Option<&str>> = row.iter().map(|(_, value)| value).collect();

        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(duckdb::params_from_iter(values))
    }

    /// Overwrite the non-key columns of the row matching `row`'s key
    fn update_locked(
        conn: &duckdb::Connection,
        table: &str,
        row: &Row,
        key_columns: &[String],
    ) -> duckdb::Result<usize> {
        let assignments: Vec<(&str, Option<&str>)> = row
            .iter()
            .filter(|(column, _)| !key_columns.iter().any(|k| k.as_str() == *column))
            .collect();
        if assignments.is_empty() {
            // Key-only row: report a hit if the key exists so no insert happens
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                quote_identifier(table),
                key_predicate(key_columns)
            );
            let keys: Vec<Option<&str>> = key_columns.iter().map(|k| row.get(k)).collect();
            let count: i64 =
                conn.query_row(&sql, duckdb::params_from_iter(keys), |r| r.get(0))?;
            return Ok(count as usize);
        }

        let set_clause = assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", quote_identifier(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_identifier(table),
            set_clause,
            key_predicate(key_columns)
        );

        let mut values: Vec<Option<&str>> = assignments.iter().map(|(_, value)| *value).collect();
        values.extend(key_columns.iter().map(|k| row.get(k)));

        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(duckdb::params_from_iter(values))
    }
}

fn key_predicate(key_columns: &[String]) -> String {
    key_columns
        .iter()
        .map(|k| format!("{} = ?", quote_identifier(k)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[async_trait(?Send)]
impl RelationalStore for DuckDBBackend {
    async fn table_exists(&self, table: &str) -> DatabaseResult<bool> {
        let conn = self.lock()?;
        Self::table_exists_locked(&conn, table)
    }

    async fn describe_table(&self, table: &str) -> DatabaseResult<Vec<String>> {
        let conn = self.lock()?;
        Self::columns_locked(&conn, table)
    }

    async fn create_table(
        &self,
        table: &str,
        columns: &[ColumnDef],
        if_not_exists: bool,
    ) -> DatabaseResult<()> {
        if columns.is_empty() {
            return Err(DatabaseError::InvalidInput(format!(
                "Table {} needs at least one column",
                table
            )));
        }

        let definitions = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.sql_name()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_identifier(table),
            definitions
        );

        self.execute(&sql)?;
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> DatabaseResult<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))?;
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> DatabaseResult<bool> {
        let conn = self.lock()?;
        Ok(Self::columns_locked(&conn, table)?
            .iter()
            .any(|c| c == column))
    }

    async fn add_column(&self, table: &str, column: &ColumnDef) -> DatabaseResult<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
            quote_identifier(table),
            quote_identifier(&column.name),
            column.column_type.sql_name()
        );
        let conn = self.lock()?;
        conn.execute(&sql, []).map_err(|e| {
            DatabaseError::SchemaChangeFailed(format!(
                "Failed to add column {}.{}: {}",
                table, column.name, e
            ))
        })?;
        Ok(())
    }

    async fn drop_column(&self, table: &str, column: &str) -> DatabaseResult<()> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
            quote_identifier(table),
            quote_identifier(column)
        );
        let conn = self.lock()?;
        conn.execute(&sql, []).map_err(|e| {
            DatabaseError::SchemaChangeFailed(format!(
                "Failed to drop column {}.{}: {}",
                table, column, e
            ))
        })?;
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> DatabaseResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Begin failed: {}", e)))?;

        let mut count = 0;
        for row in rows {
            count += Self::insert_locked(&tx, table, row).map_err(|e| {
                DatabaseError::QueryFailed(format!("Failed to insert into {}: {}", table, e))
            })?;
        }

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Commit failed: {}", e)))?;
        Ok(count)
    }

    async fn scan_rows(
        &self,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> DatabaseResult<Vec<Row>> {
        let conn = self.lock()?;
        let columns = Self::columns_locked(&conn, table)?;
        let select_list = columns
            .iter()
            .map(|c| format!("CAST({} AS VARCHAR)", quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid LIMIT ? OFFSET ?",
            select_list,
            quote_identifier(table)
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
        let rows = stmt
            .query_map(duckdb::params![limit as i64, offset as i64], |row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| -> duckdb::Result<(String, Option<String>)> {
                        Ok((name.clone(), row.get(i)?))
                    })
                    .collect::<duckdb::Result<Row>>()
            })
            .map_err(|e| DatabaseError::QueryFailed(format!("Scan failed: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?;

        Ok(rows)
    }

    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[Row],
        key_columns: &[String],
    ) -> DatabaseResult<usize> {
        if key_columns.is_empty() {
            return Err(DatabaseError::InvalidInput(
                "Upsert requires at least one key column".to_string(),
            ));
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Begin failed: {}", e)))?;

        for row in rows {
            if let Some(key) = key_columns.iter().find(|k| !row.contains(k)) {
                return Err(DatabaseError::UpsertFailed(format!(
                    "Row is missing key column {}",
                    key
                )));
            }

            let updated = Self::update_locked(&tx, table, row, key_columns).map_err(|e| {
                DatabaseError::UpsertFailed(format!("Failed to update {}: {}", table, e))
            })?;
            if updated == 0 {
                Self::insert_locked(&tx, table, row).map_err(|e| {
                    DatabaseError::UpsertFailed(format!("Failed to insert into {}: {}", table, e))
                })?;
            }
        }

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Commit failed: {}", e)))?;
        Ok(rows.len())
    }

    async fn select_pairs(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        filter: Option<(&str, &str)>,
    ) -> DatabaseResult<Vec<(String, String)>> {
        let mut sql = format!(
            "SELECT CAST({} AS VARCHAR), CAST({} AS VARCHAR) FROM {}",
            quote_identifier(key_column),
            quote_identifier(value_column),
            quote_identifier(table)
        );
        let mut params: Vec<&str> = Vec::new();
        if let Some((column, value)) = filter {
            sql.push_str(&format!(
                " WHERE CAST({} AS VARCHAR) = ?",
                quote_identifier(column)
            ));
            params.push(value);
        }

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
        let pairs = stmt
            .query_map(duckdb::params_from_iter(params), |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?
            .filter_map(|pair| match pair {
                Ok((Some(key), Some(value))) => Some(Ok((key, value))),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?;

        Ok(pairs)
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec!["code".to_string()]
    }

    async fn variant_table(backend: &DuckDBBackend) {
        backend
            .create_table(
                "variant",
                &[ColumnDef::text("code"), ColumnDef::text("axis")],
                true,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert!(backend.is_in_memory());
        assert!(backend.db_path().is_none());
    }

    #[tokio::test]
    async fn test_backend_type() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert_eq!(backend.backend_type(), "duckdb");
    }

    #[tokio::test]
    async fn test_describe_and_alter() {
        let backend = DuckDBBackend::in_memory().unwrap();
        variant_table(&backend).await;

        backend
            .add_column("variant", &ColumnDef::text("name_en"))
            .await
            .unwrap();
        backend
            .add_column("variant", &ColumnDef::text("name_en"))
            .await
            .unwrap();
        assert_eq!(
            backend.describe_table("variant").await.unwrap(),
            vec!["code", "axis", "name_en"]
        );
        assert!(backend.column_exists("variant", "name_en").await.unwrap());

        backend.drop_column("variant", "name_en").await.unwrap();
        backend.drop_column("variant", "name_en").await.unwrap();
        assert_eq!(
            backend.describe_table("variant").await.unwrap(),
            vec!["code", "axis"]
        );
    }

    #[tokio::test]
    async fn test_describe_missing_table() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let err = backend.describe_table("missing").await.unwrap_err();
        assert!(matches!(err, DatabaseError::TableNotFound(_)));
        backend.drop_table("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_overwrites() {
        let backend = DuckDBBackend::in_memory().unwrap();
        variant_table(&backend).await;

        let first = Row::new().with("code", Some("tshirt")).with("axis", Some("12"));
        backend.upsert_rows("variant", &[first], &keys()).await.unwrap();

        let second = Row::new().with("code", Some("tshirt")).with("axis", Some("12,7"));
        let other = Row::new().with("code", Some("jeans")).with("axis", Some("7"));
        backend
            .upsert_rows("variant", &[second, other], &keys())
            .await
            .unwrap();

        let rows = backend.scan_rows("variant", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("code"), Some("tshirt"));
        assert_eq!(rows[0].get("axis"), Some("12,7"));
        assert_eq!(rows[1].get("code"), Some("jeans"));
    }

    #[tokio::test]
    async fn test_scan_rows_paging() {
        let backend = DuckDBBackend::in_memory().unwrap();
        variant_table(&backend).await;
        let rows: Vec<Row> = (0..7)
            .map(|i| Row::new().with("code", Some(format!("v{}", i))))
            .collect();
        assert_eq!(backend.insert_rows("variant", &rows).await.unwrap(), 7);

        let page = backend.scan_rows("variant", 5, 5).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].get("code"), Some("v5"));
        assert_eq!(page[0].get("axis"), None);
    }

    #[tokio::test]
    async fn test_select_pairs_casts_integer_ids() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend
            .execute(
                "CREATE TABLE eav_attribute \
                 (attribute_id INTEGER, entity_type_id INTEGER, attribute_code VARCHAR)",
            )
            .unwrap();
        backend
            .execute(
                "INSERT INTO eav_attribute VALUES \
                 (12, 4, 'color'), (7, 4, 'size'), (40, 3, 'name')",
            )
            .unwrap();

        let mut pairs = backend
            .select_pairs(
                "eav_attribute",
                "attribute_code",
                "attribute_id",
                Some(("entity_type_id", "4")),
            )
            .await
            .unwrap();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("color".to_string(), "12".to_string()),
                ("size".to_string(), "7".to_string())
            ]
        );
    }
}
