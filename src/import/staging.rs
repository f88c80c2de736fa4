//! Staging table lifecycle
//!
//! A staging table mirrors the header of one source file, holds its raw
//! rows for the duration of a single run and is dropped afterwards.

use std::path::Path;

use crate::database::{ColumnDef, RelationalStore, Row};
use crate::error::{ImportError, ImportResult};
use crate::import::source::{SourceFormat, TabularSource};

/// Staging table operations against a relational store
pub struct StagingStore<'a, S: RelationalStore + ?Sized> {
    store: &'a S,
    format: SourceFormat,
    chunk_size: usize,
}

impl<'a, S: RelationalStore + ?Sized> StagingStore<'a, S> {
    /// # Arguments
    /// * `format` - Delimiter/enclosure of source files
    /// * `chunk_size` - Rows per insert call while loading
    pub fn new(store: &'a S, format: SourceFormat, chunk_size: usize) -> Self {
        Self {
            store,
            format,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Create `table` with one text column per header column of `path`
    ///
    /// An existing table of the same name is dropped first.
    ///
    /// # Returns
    /// `SourceNotFound` if `path` is not a readable file; the run must abort
    pub async fn create(
        &self,
        path: &Path,
        table: &str,
        unique_columns: &[&str],
    ) -> ImportResult<Vec<String>> {
        let source = TabularSource::open(path, self.format)?;
        let headers = source.headers().to_vec();

        if let Some(missing) = unique_columns
            .iter()
            .find(|c| !headers.iter().any(|h| h.as_str() == **c))
        {
            return Err(ImportError::InvalidHeader(format!(
                "missing key column {}",
                missing
            )));
        }

        let columns: Vec<ColumnDef> = headers.iter().map(ColumnDef::text).collect();

        self.store
            .drop_table(table)
            .await
            .map_err(ImportError::Staging)?;
        self.store
            .create_table(table, &columns, false)
            .await
            .map_err(ImportError::Staging)?;

        tracing::info!(table, columns = headers.len(), "Created staging table");
        Ok(headers)
    }

    /// Stream the data rows of `path` into `table`
    ///
    /// Chunks already inserted stay in place if a later chunk fails.
    ///
    /// # Returns
    /// Number of rows loaded
    pub async fn load(&self, path: &Path, table: &str) -> ImportResult<usize> {
        let mut source = TabularSource::open(path, self.format)?;
        let mut chunk: Vec<Row> = Vec::with_capacity(self.chunk_size);
        let mut count = 0;

        for row in source.rows() {
            chunk.push(row?);
            if chunk.len() >= self.chunk_size {
                count += self.flush(table, &mut chunk).await?;
            }
        }
        if !chunk.is_empty() {
            count += self.flush(table, &mut chunk).await?;
        }

        tracing::info!(table, rows = count, "Loaded staging table");
        Ok(count)
    }

    async fn flush(&self, table: &str, chunk: &mut Vec<Row>) -> ImportResult<usize> {
        let inserted = self
            .store
            .insert_rows(table, chunk)
            .await
            .map_err(ImportError::Staging)?;
        chunk.clear();
        Ok(inserted)
    }

    /// Ordered column list of the staging table
    pub async fn describe(&self, table: &str) -> ImportResult<Vec<String>> {
        self.store
            .describe_table(table)
            .await
            .map_err(ImportError::Staging)
    }

    /// Drop the staging table; no error if it is already gone
    pub async fn drop(&self, table: &str) -> ImportResult<()> {
        self.store
            .drop_table(table)
            .await
            .map_err(ImportError::Staging)?;
        tracing::debug!(table, "Dropped staging table");
        Ok(())
    }
}
