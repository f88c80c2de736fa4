//! Batched merge of staging rows into the destination table
//!
//! Rows are read from staging page by page, rebuilt under destination column
//! names and written with upsert-by-`code` in batches of `batch_size`. Each
//! batch commits on its own: a failure leaves earlier batches applied.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::database::{RelationalStore, Row};
use crate::error::{ImportError, ImportResult};
use crate::import::attributes::AttributeRegistry;
use crate::import::schema::{AXIS_COLUMN, CODE_COLUMN, FAMILY_VARIANT_COLUMN};
use crate::import::translator::ColumnTranslator;

/// Rows per upsert batch
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Counters from a merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Rows read from staging
    pub rows_read: usize,
    /// Rows handed to upsert
    pub rows_written: usize,
    /// Upsert calls made
    pub batches: usize,
    /// Rows skipped for an empty `code`
    pub skipped_rows: usize,
    /// Axis codes absent from the attribute registry
    pub unresolved_codes: usize,
    /// Whether axis codes were translated to ids
    pub axis_translated: bool,
}

/// Resolve a comma-separated list of attribute codes into a comma-separated
/// list of ids, dropping codes the registry does not know
///
/// # Returns
/// The joined ids and the number of codes that failed to resolve
pub fn resolve_axis(value: &str, registry: &AttributeRegistry) -> (String, usize) {
    let mut unresolved = 0;
    let ids: Vec<String> = value
        .split(',')
        .filter(|code| !code.is_empty())
        .filter_map(|code| match registry.resolve(code) {
            Some(id) => Some(id.to_string()),
            None => {
                tracing::debug!(code, "Dropping unresolved axis attribute");
                unresolved += 1;
                None
            }
        })
        .collect();
    (ids.join(","), unresolved)
}

/// Staging -> destination column pairs for one merge
#[derive(Debug)]
struct ColumnPlan {
    pairs: Vec<(String, String)>,
    translate_axis: bool,
}

impl ColumnPlan {
    fn new(
        staging_columns: &[String],
        destination_columns: &[String],
        translator: &ColumnTranslator,
    ) -> Self {
        let destination: HashSet<&str> = destination_columns.iter().map(String::as_str).collect();
        let pairs = staging_columns
            .iter()
            .filter_map(|column| {
                let target = if column == CODE_COLUMN {
                    column.clone()
                } else {
                    translator.translate(column)
                };
                destination
                    .contains(target.as_str())
                    .then(|| (column.clone(), target))
            })
            .collect();

        Self {
            pairs,
            translate_axis: !staging_columns.iter().any(|c| c == FAMILY_VARIANT_COLUMN),
        }
    }
}

/// Writes staging rows into the destination table
pub struct MergeEngine<'a, S: RelationalStore + ?Sized> {
    store: &'a S,
    translator: &'a ColumnTranslator,
    batch_size: usize,
}

impl<'a, S: RelationalStore + ?Sized> MergeEngine<'a, S> {
    pub fn new(store: &'a S, translator: &'a ColumnTranslator) -> Self {
        Self {
            store,
            translator,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Merge every staging row into `destination`
    pub async fn merge(
        &self,
        staging: &str,
        destination: &str,
        registry: &AttributeRegistry,
    ) -> ImportResult<MergeStats> {
        let staging_columns = self
            .store
            .describe_table(staging)
            .await
            .map_err(ImportError::Staging)?;
        let destination_columns = self
            .store
            .describe_table(destination)
            .await
            .map_err(|source| ImportError::Merge { batch: 0, source })?;
        let plan = ColumnPlan::new(&staging_columns, &destination_columns, self.translator);
        let keys = vec![CODE_COLUMN.to_string()];

        let mut stats = MergeStats {
            axis_translated: plan.translate_axis,
            ..Default::default()
        };
        let mut batch: Vec<Row> = Vec::with_capacity(self.batch_size);
        let mut offset = 0;

        loop {
            let page = self
                .store
                .scan_rows(staging, offset, self.batch_size)
                .await
                .map_err(ImportError::Staging)?;
            if page.is_empty() {
                break;
            }
            offset += page.len();

            for row in &page {
                stats.rows_read += 1;
                match self.build_row(row, &plan, registry, &mut stats) {
                    Some(built) => batch.push(built),
                    None => continue,
                }
                if batch.len() >= self.batch_size {
                    self.flush(destination, &mut batch, &keys, &mut stats).await?;
                }
            }
        }

        if !batch.is_empty() {
            self.flush(destination, &mut batch, &keys, &mut stats).await?;
        }

        tracing::info!(
            destination,
            rows = stats.rows_written,
            batches = stats.batches,
            skipped = stats.skipped_rows,
            unresolved = stats.unresolved_codes,
            "Merged staging rows"
        );
        Ok(stats)
    }

    /// Destination row for one staging row; `None` when the row has no key
    fn build_row(
        &self,
        row: &Row,
        plan: &ColumnPlan,
        registry: &AttributeRegistry,
        stats: &mut MergeStats,
    ) -> Option<Row> {
        let code = row.get(CODE_COLUMN).unwrap_or_default();
        if code.is_empty() {
            tracing::warn!(row = stats.rows_read, "Skipping staging row without code");
            stats.skipped_rows += 1;
            return None;
        }

        let mut built = Row::new();
        for (source, target) in &plan.pairs {
            let value = row.get(source);
            let value = if source == AXIS_COLUMN && plan.translate_axis {
                let (ids, unresolved) = resolve_axis(value.unwrap_or_default(), registry);
                stats.unresolved_codes += unresolved;
                Some(ids)
            } else {
                value.map(str::to_string)
            };
            built.set(target.clone(), value);
        }
        Some(built)
    }

    async fn flush(
        &self,
        destination: &str,
        batch: &mut Vec<Row>,
        keys: &[String],
        stats: &mut MergeStats,
    ) -> ImportResult<()> {
        let number = stats.batches + 1;
        let written = self
            .store
            .upsert_rows(destination, batch, keys)
            .await
            .map_err(|source| ImportError::Merge {
                batch: number,
                source,
            })?;

        tracing::debug!(batch = number, rows = written, "Upserted batch");
        stats.batches = number;
        stats.rows_written += written;
        batch.clear();
        Ok(())
    }
}
