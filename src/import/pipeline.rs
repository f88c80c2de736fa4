//! Variant import orchestration
//!
//! Runs the phases strictly in order:
//!
//! ```text
//! Start -> StagingCreated -> StagingLoaded -> SchemaReconciled -> Merged -> StagingDropped
//!   \-> Aborted (source file missing or unreadable)
//! ```
//!
//! A missing or unreadable source file is the only failure turned into a
//! result; every other error is returned to the caller. Once the staging
//! table exists it is dropped on every exit path unless
//! `keep_staging_on_error` is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Instrument;
use uuid::Uuid;

use crate::database::config::ImportSection;
use crate::database::{ImportConfig, RelationalStore};
use crate::error::{ImportError, ImportResult};
use crate::import::attributes::AttributeRegistry;
use crate::import::merge::{MergeEngine, MergeStats};
use crate::import::schema::{
    CODE_COLUMN, EXCLUDED_COLUMNS, FIXED_COLUMNS, SchemaChange, SchemaReconciler,
};
use crate::import::source::SourceFormat;
use crate::import::staging::StagingStore;
use crate::import::translator::ColumnTranslator;

/// Phase of an import run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    StagingCreated,
    StagingLoaded,
    SchemaReconciled,
    Merged,
    StagingDropped,
    Aborted,
}

impl RunState {
    /// The phase that follows a successful step
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Start => Some(RunState::StagingCreated),
            RunState::StagingCreated => Some(RunState::StagingLoaded),
            RunState::StagingLoaded => Some(RunState::SchemaReconciled),
            RunState::SchemaReconciled => Some(RunState::Merged),
            RunState::Merged => Some(RunState::StagingDropped),
            RunState::StagingDropped | RunState::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::StagingDropped | RunState::Aborted)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Start => "start",
            RunState::StagingCreated => "staging created",
            RunState::StagingLoaded => "staging loaded",
            RunState::SchemaReconciled => "schema reconciled",
            RunState::Merged => "merged",
            RunState::StagingDropped => "staging dropped",
            RunState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Outcome surfaced to the caller of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Whether the caller should run dependent steps
    #[serde(rename = "continue")]
    pub continue_run: bool,
    /// Whether the step succeeded
    pub status: bool,
    /// Human-readable message
    pub message: String,
}

impl StepResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            continue_run: true,
            status: true,
            message: message.into(),
        }
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self {
            continue_run: false,
            status: false,
            message: message.into(),
        }
    }
}

/// A completed phase and what it reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    pub state: RunState,
    pub message: String,
}

/// Full record of one import run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub code: String,
    pub state: RunState,
    pub outcome: StepResult,
    pub rows_loaded: usize,
    pub merge: MergeStats,
    pub schema_changes: Vec<SchemaChange>,
    pub steps: Vec<StepLog>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new(code: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            code: code.to_string(),
            state: RunState::Start,
            outcome: StepResult::success(String::new()),
            rows_loaded: 0,
            merge: MergeStats::default(),
            schema_changes: Vec::new(),
            steps: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn advance(&mut self, to: RunState, message: impl Into<String>) {
        debug_assert_eq!(self.state.next(), Some(to), "out-of-order transition");
        let message = message.into();
        tracing::info!(state = %to, "{}", message);
        self.state = to;
        self.steps.push(StepLog { state: to, message });
    }

    fn abort(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.state = RunState::Aborted;
        self.steps.push(StepLog {
            state: RunState::Aborted,
            message: message.clone(),
        });
        self.outcome = StepResult::abort(message);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.outcome.status && self.state == RunState::StagingDropped
    }

    /// Multi-line text rendering for terminals
    pub fn summary(&self) -> String {
        let mut output = format!("Import {} ({})\n", self.code, self.run_id);
        for step in &self.steps {
            output.push_str(&format!("  [{}] {}\n", step.state, step.message));
        }
        if self.state == RunState::StagingDropped {
            output.push_str(&format!(
                "  {} row(s) written in {} batch(es), {} skipped, {} unresolved axis code(s)\n",
                self.merge.rows_written,
                self.merge.batches,
                self.merge.skipped_rows,
                self.merge.unresolved_codes
            ));
        }
        output.push_str(&format!(
            "Status: {}, continue: {}: {}",
            if self.outcome.status { "ok" } else { "failed" },
            self.outcome.continue_run,
            self.outcome.message
        ));
        output
    }
}

/// Variant import run against a relational store
pub struct VariantImport<'a, S: RelationalStore + ?Sized> {
    store: &'a S,
    settings: ImportSection,
    staging_table: String,
    format: SourceFormat,
    translator: ColumnTranslator,
}

impl<'a, S: RelationalStore + ?Sized> VariantImport<'a, S> {
    pub fn new(store: &'a S, config: &ImportConfig) -> ImportResult<Self> {
        config
            .validate()
            .map_err(|e| ImportError::Config(e.to_string()))?;
        let format = SourceFormat {
            delimiter: config
                .source
                .delimiter_byte()
                .map_err(|e| ImportError::Config(e.to_string()))?,
            enclosure: config
                .source
                .enclosure_byte()
                .map_err(|e| ImportError::Config(e.to_string()))?,
        };

        Ok(Self {
            store,
            settings: config.import.clone(),
            staging_table: config.staging_table(),
            format,
            translator: ColumnTranslator::default(),
        })
    }

    /// Replace the column naming rules
    pub fn with_translator(mut self, translator: ColumnTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn staging_table(&self) -> &str {
        &self.staging_table
    }

    /// Import one source file
    pub async fn run(&self, path: &Path) -> ImportResult<RunReport> {
        let mut report = RunReport::new(&self.settings.code);
        let span = tracing::info_span!(
            "variant_import",
            run_id = %report.run_id,
            code = %self.settings.code,
            backend = self.store.backend_type()
        );

        async {
            self.execute(path, &mut report).await?;
            Ok::<_, ImportError>(report)
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, path: &Path, report: &mut RunReport) -> ImportResult<()> {
        let staging = StagingStore::new(self.store, self.format, self.settings.batch_size);

        match staging
            .create(path, &self.staging_table, &[CODE_COLUMN])
            .await
        {
            Ok(_) => report.advance(
                RunState::StagingCreated,
                format!("Created {}", self.staging_table),
            ),
            Err(ImportError::SourceNotFound(missing)) => {
                report.abort(format!("File not found: {}", missing.display()));
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if let Err(e) = self.staged(&staging, path, report).await {
            if self.settings.keep_staging_on_error {
                tracing::warn!(table = %self.staging_table, "Keeping staging table after failure");
            } else if let Err(cleanup) = staging.drop(&self.staging_table).await {
                tracing::warn!(error = %cleanup, "Failed to drop staging table after failure");
            }
            return Err(e);
        }

        staging.drop(&self.staging_table).await?;
        report.advance(
            RunState::StagingDropped,
            format!("Dropped {}", self.staging_table),
        );
        report.outcome = StepResult::success(format!("{} line(s) found", report.rows_loaded));
        report.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Phases that run while the staging table exists
    async fn staged(
        &self,
        staging: &StagingStore<'_, S>,
        path: &Path,
        report: &mut RunReport,
    ) -> ImportResult<()> {
        let destination = self.settings.destination_table.as_str();

        report.rows_loaded = staging.load(path, &self.staging_table).await?;
        report.advance(
            RunState::StagingLoaded,
            format!("{} line(s) found", report.rows_loaded),
        );

        let reconciler = SchemaReconciler::new(self.store, &self.translator);
        reconciler.ensure_destination(destination).await?;
        if self.settings.rebuild_schema {
            let dropped = reconciler
                .reconcile_drop(destination, &FIXED_COLUMNS)
                .await?;
            report.schema_changes.extend(dropped);
        }
        let added = reconciler
            .reconcile_add(destination, &self.staging_table, &EXCLUDED_COLUMNS)
            .await?;
        report.schema_changes.extend(added);
        report.advance(
            RunState::SchemaReconciled,
            format!("{} schema change(s)", report.schema_changes.len()),
        );

        let registry = AttributeRegistry::load(
            self.store,
            &self.settings.attribute_table,
            self.settings.entity_type_id,
        )
        .await?;
        report.merge = MergeEngine::new(self.store, &self.translator)
            .with_batch_size(self.settings.batch_size)
            .merge(&self.staging_table, destination, &registry)
            .await?;
        report.advance(
            RunState::Merged,
            format!(
                "{} row(s) merged into {}",
                report.merge.rows_written, destination
            ),
        );

        Ok(())
    }
}
