//! Destination schema reconciliation
//!
//! Schema evolution is split in two: pure planners diff column lists into an
//! ordered list of [`SchemaChange`]s, and [`SchemaReconciler::apply`] replays
//! those changes through the store. Every change is idempotent, so a run can
//! be re-executed against a partially migrated table.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::database::{ColumnDef, RelationalStore};
use crate::error::{ImportError, ImportResult};
use crate::import::translator::ColumnTranslator;

/// Row key of the destination table
pub const CODE_COLUMN: &str = "code";
/// Attribute-id list column
pub const AXIS_COLUMN: &str = "axis";
/// Presence of this staging column disables axis translation
pub const FAMILY_VARIANT_COLUMN: &str = "family_variant";

/// Width of the `axis` column added to staging tables that lack one
pub const STAGING_AXIS_WIDTH: u32 = 255;

/// Columns a drop-reconcile keeps on the destination
pub const FIXED_COLUMNS: [&str; 2] = [CODE_COLUMN, AXIS_COLUMN];

/// Staging columns never copied into the destination schema
pub const EXCLUDED_COLUMNS: [&str; 5] =
    [CODE_COLUMN, AXIS_COLUMN, "type", "_entity_id", "_is_new"];

/// One column-level schema mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaChange {
    AddColumn { table: String, column: ColumnDef },
    DropColumn { table: String, column: String },
}

impl std::fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaChange::AddColumn { table, column } => {
                write!(f, "add {}.{} {}", table, column.name, column.column_type)
            }
            SchemaChange::DropColumn { table, column } => write!(f, "drop {}.{}", table, column),
        }
    }
}

/// Drop every destination column outside `except`
pub fn plan_drop(
    table: &str,
    destination_columns: &[String],
    except: &[&str],
) -> Vec<SchemaChange> {
    destination_columns
        .iter()
        .filter(|column| !except.contains(&column.as_str()))
        .map(|column| SchemaChange::DropColumn {
            table: table.to_string(),
            column: column.clone(),
        })
        .collect()
}

/// Add a text column for every translated staging column the destination
/// lacks, skipping staging columns in `except`
pub fn plan_add(
    table: &str,
    staging_columns: &[String],
    destination_columns: &[String],
    except: &[&str],
    translator: &ColumnTranslator,
) -> Vec<SchemaChange> {
    let mut present: HashSet<String> = destination_columns.iter().cloned().collect();

    staging_columns
        .iter()
        .filter(|column| !except.contains(&column.as_str()))
        .filter_map(|column| {
            let name = translator.translate(column);
            present.insert(name.clone()).then(|| SchemaChange::AddColumn {
                table: table.to_string(),
                column: ColumnDef::text(name),
            })
        })
        .collect()
}

/// Applies schema diffs to destination and staging tables
pub struct SchemaReconciler<'a, S: RelationalStore + ?Sized> {
    store: &'a S,
    translator: &'a ColumnTranslator,
}

impl<'a, S: RelationalStore + ?Sized> SchemaReconciler<'a, S> {
    pub fn new(store: &'a S, translator: &'a ColumnTranslator) -> Self {
        Self { store, translator }
    }

    /// Create the destination with its fixed columns if it does not exist
    pub async fn ensure_destination(&self, destination: &str) -> ImportResult<()> {
        let columns: Vec<ColumnDef> = FIXED_COLUMNS.iter().map(|c| ColumnDef::text(*c)).collect();
        self.store
            .create_table(destination, &columns, true)
            .await
            .map_err(ImportError::SchemaOperation)
    }

    /// Remove every destination column not in `except`
    pub async fn reconcile_drop(
        &self,
        destination: &str,
        except: &[&str],
    ) -> ImportResult<Vec<SchemaChange>> {
        let columns = self.describe(destination).await?;
        let changes = plan_drop(destination, &columns, except);
        self.apply(&changes).await?;
        Ok(changes)
    }

    /// Add the translated staging columns the destination lacks, then make
    /// sure the staging table itself carries an `axis` column
    pub async fn reconcile_add(
        &self,
        destination: &str,
        staging: &str,
        except: &[&str],
    ) -> ImportResult<Vec<SchemaChange>> {
        let staging_columns = self.describe(staging).await?;
        let destination_columns = self.describe(destination).await?;

        let mut changes = plan_add(
            destination,
            &staging_columns,
            &destination_columns,
            except,
            self.translator,
        );
        if !staging_columns.iter().any(|c| c == AXIS_COLUMN) {
            changes.push(SchemaChange::AddColumn {
                table: staging.to_string(),
                column: ColumnDef::varchar(AXIS_COLUMN, STAGING_AXIS_WIDTH),
            });
        }

        self.apply(&changes).await?;
        Ok(changes)
    }

    /// Replay changes in order
    pub async fn apply(&self, changes: &[SchemaChange]) -> ImportResult<()> {
        for change in changes {
            tracing::debug!(%change, "Applying schema change");
            let applied = match change {
                SchemaChange::AddColumn { table, column } => {
                    self.store.add_column(table, column).await
                }
                SchemaChange::DropColumn { table, column } => {
                    self.store.drop_column(table, column).await
                }
            };
            applied.map_err(ImportError::SchemaOperation)?;
        }
        Ok(())
    }

    async fn describe(&self, table: &str) -> ImportResult<Vec<String>> {
        self.store
            .describe_table(table)
            .await
            .map_err(ImportError::SchemaOperation)
    }
}
