//! In-memory store implementation
//!
//! Keeps every table in a `Mutex`-guarded map. Used by the test suite and
//! for dry runs where nothing should be persisted. Every upsert call is
//! recorded so batch boundaries can be observed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{ColumnDef, DatabaseError, DatabaseResult, RelationalStore, Row};

#[derive(Debug, Default, Clone)]
struct MemoryTable {
    columns: Vec<ColumnDef>,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    fn check_columns(&self, table: &str, row: &Row) -> DatabaseResult<()> {
        match row.columns().find(|column| !self.has_column(column)) {
            Some(unknown) => Err(DatabaseError::InvalidInput(format!(
                "Table {} has no column {}",
                table, unknown
            ))),
            None => Ok(()),
        }
    }

    /// Project a row onto the full column list, NULL-filling absent columns
    fn project(&self, row: &Row) -> Row {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), row.get(&c.name).map(str::to_string)))
            .collect()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    upsert_batches: Vec<usize>,
}

/// In-memory relational store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DatabaseResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Create (or replace) an attribute table holding `(attribute_code,
    /// attribute_id, entity_type_id)` rows
    pub fn seed_attributes(
        &self,
        table: &str,
        entity_type_id: i64,
        attributes: &[(&str, i64)],
    ) -> DatabaseResult<()> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .entry(table.to_string())
            .or_insert_with(|| MemoryTable {
                columns: vec![
                    ColumnDef::text("attribute_code"),
                    ColumnDef::text("attribute_id"),
                    ColumnDef::text("entity_type_id"),
                ],
                rows: Vec::new(),
            });

        for (code, id) in attributes {
            entry.rows.push(
                Row::new()
                    .with("attribute_code", Some(*code))
                    .with("attribute_id", Some(id.to_string()))
                    .with("entity_type_id", Some(entity_type_id.to_string())),
            );
        }
        Ok(())
    }

    /// Sizes of every upsert call made so far, in call order
    pub fn upsert_batches(&self) -> Vec<usize> {
        self.lock()
            .map(|state| state.upsert_batches.clone())
            .unwrap_or_default()
    }

    /// Snapshot of all rows in a table
    pub fn rows(&self, table: &str) -> DatabaseResult<Vec<Row>> {
        let state = self.lock()?;
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))
    }
}

#[async_trait(?Send)]
impl RelationalStore for MemoryStore {
    async fn table_exists(&self, table: &str) -> DatabaseResult<bool> {
        Ok(self.lock()?.tables.contains_key(table))
    }

    async fn describe_table(&self, table: &str) -> DatabaseResult<Vec<String>> {
        let state = self.lock()?;
        let entry = state
            .tables
            .get(table)
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;
        Ok(entry.columns.iter().map(|c| c.name.clone()).collect())
    }

    async fn create_table(
        &self,
        table: &str,
        columns: &[ColumnDef],
        if_not_exists: bool,
    ) -> DatabaseResult<()> {
        let mut state = self.lock()?;
        if state.tables.contains_key(table) {
            if if_not_exists {
                return Ok(());
            }
            return Err(DatabaseError::QueryFailed(format!(
                "Table {} already exists",
                table
            )));
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = columns.iter().find(|c| !seen.insert(c.name.as_str())) {
            return Err(DatabaseError::InvalidInput(format!(
                "Duplicate column {} in table {}",
                duplicate.name, table
            )));
        }

        state.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: columns.to_vec(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> DatabaseResult<()> {
        self.lock()?.tables.remove(table);
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> DatabaseResult<bool> {
        let state = self.lock()?;
        let entry = state
            .tables
            .get(table)
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;
        Ok(entry.has_column(column))
    }

    async fn add_column(&self, table: &str, column: &ColumnDef) -> DatabaseResult<()> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;

        if let Some(existing) = entry.columns.iter().find(|c| c.name == column.name) {
            if existing.column_type != column.column_type {
                tracing::debug!(
                    table,
                    column = %column.name,
                    existing = %existing.column_type,
                    requested = %column.column_type,
                    "Column already present with a different type"
                );
            }
            return Ok(());
        }

        entry.columns.push(column.clone());
        for row in &mut entry.rows {
            row.set(column.name.clone(), None);
        }
        Ok(())
    }

    async fn drop_column(&self, table: &str, column: &str) -> DatabaseResult<()> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;

        if !entry.has_column(column) {
            return Ok(());
        }

        entry.columns.retain(|c| c.name != column);
        let columns = entry.columns.clone();
        for row in &mut entry.rows {
            *row = columns
                .iter()
                .map(|c| (c.name.clone(), row.get(&c.name).map(str::to_string)))
                .collect();
        }
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> DatabaseResult<usize> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;

        for row in rows {
            entry.check_columns(table, row)?;
        }
        let projected: Vec<Row> = rows.iter().map(|row| entry.project(row)).collect();
        entry.rows.extend(projected);
        Ok(rows.len())
    }

    async fn scan_rows(
        &self,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> DatabaseResult<Vec<Row>> {
        let state = self.lock()?;
        let entry = state
            .tables
            .get(table)
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;
        Ok(entry.rows.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[Row],
        key_columns: &[String],
    ) -> DatabaseResult<usize> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;

        // Validate the whole batch first so a bad row leaves the table untouched
        for row in rows {
            entry.check_columns(table, row)?;
            if let Some(key) = key_columns.iter().find(|k| !row.contains(k)) {
                return Err(DatabaseError::UpsertFailed(format!(
                    "Row is missing key column {}",
                    key
                )));
            }
        }

        for row in rows {
            let position = entry
                .rows
                .iter()
                .position(|candidate| key_columns.iter().all(|k| candidate.get(k) == row.get(k)));
            match position {
                Some(index) => {
                    let existing = &mut entry.rows[index];
                    for (column, value) in row.iter() {
                        existing.set(column, value.map(str::to_string));
                    }
                }
                None => {
                    let projected = entry.project(row);
                    entry.rows.push(projected);
                }
            }
        }

        state.upsert_batches.push(rows.len());
        Ok(rows.len())
    }

    async fn select_pairs(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        filter: Option<(&str, &str)>,
    ) -> DatabaseResult<Vec<(String, String)>> {
        let state = self.lock()?;
        let entry = state
            .tables
            .get(table)
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;

        for column in [Some(key_column), Some(value_column), filter.map(|f| f.0)]
            .into_iter()
            .flatten()
        {
            if !entry.has_column(column) {
                return Err(DatabaseError::QueryFailed(format!(
                    "Table {} has no column {}",
                    table, column
                )));
            }
        }

        Ok(entry
            .rows
            .iter()
            .filter(|row| filter.is_none_or(|(column, value)| row.get(column) == Some(value)))
            .filter_map(|row| {
                Some((
                    row.get(key_column)?.to_string(),
                    row.get(value_column)?.to_string(),
                ))
            })
            .collect())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
