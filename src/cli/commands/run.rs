//! Run command: import one variant file into the configured store

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::database::config::{DatabaseBackendType, ImportConfig};
use crate::database::{MemoryStore, RelationalStore};
use crate::import::{RunReport, VariantImport};

/// How the run report is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(CliError::InvalidArgument(format!(
                "Unknown output format: {}. Use 'text' or 'json'.",
                other
            ))),
        }
    }
}

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Delimited variant file
    pub file: PathBuf,
    /// Directory holding `.variant-import.toml` and the database file
    pub workspace: PathBuf,
    pub format: OutputFormat,
    /// Force the memory backend regardless of configuration
    pub in_memory: bool,
}

/// Handle the run command
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let mut config = ImportConfig::load(&args.workspace)?;
    if args.in_memory {
        config.database.backend = DatabaseBackendType::Memory;
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))?;

    let report = rt.block_on(run_configured(&config, args))?;

    print_report(&report, args.format)?;

    if report.outcome.status {
        Ok(())
    } else {
        Err(CliError::Aborted(report.outcome.message))
    }
}

async fn run_configured(config: &ImportConfig, args: &RunArgs) -> Result<RunReport, CliError> {
    match config.database.backend {
        #[cfg(feature = "duckdb-backend")]
        DatabaseBackendType::DuckDB => {
            use crate::database::DuckDBBackend;

            let db_path = config.get_duckdb_path(&args.workspace);
            let backend = DuckDBBackend::new(&db_path)?;
            tracing::info!(path = %db_path.display(), "Opened DuckDB database");
            run_import(&backend, config, args).await
        }
        #[cfg(not(feature = "duckdb-backend"))]
        DatabaseBackendType::DuckDB => Err(CliError::InvalidArgument(
            "DuckDB backend not available. Build with --features duckdb-backend".to_string(),
        )),
        DatabaseBackendType::Memory => {
            let store = MemoryStore::new();
            // Empty registry: axis codes all resolve to nothing
            store.seed_attributes(
                &config.import.attribute_table,
                config.import.entity_type_id,
                &[],
            )?;
            run_import(&store, config, args).await
        }
    }
}

async fn run_import<S: RelationalStore + ?Sized>(
    store: &S,
    config: &ImportConfig,
    args: &RunArgs,
) -> Result<RunReport, CliError> {
    let import = VariantImport::new(store, config)?;
    Ok(import.run(&args.file).await?)
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Text => println!("{}", report.summary()),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report)
                .map_err(|e| CliError::IoError(format!("Failed to serialize report: {}", e)))?;
            println!("{}", json);
        }
    }
    Ok(())
}
