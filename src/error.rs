//! Import run error types

use std::path::PathBuf;

use crate::database::DatabaseError;

/// Error raised by an import run
///
/// Only [`ImportError::SourceNotFound`] is recovered by the pipeline; every
/// other variant terminates the run and reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Input file missing, not a regular file, or not readable
    #[error("File not found: {0}")]
    SourceNotFound(PathBuf),

    /// Input file could not be read or decoded
    #[error("Failed to read {path}: {message}")]
    SourceRead { path: PathBuf, message: String },

    /// Header row is unusable
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Staging table create/load/drop failed
    #[error("Staging failed: {0}")]
    Staging(#[source] DatabaseError),

    /// Destination or staging column add/drop rejected
    #[error("Schema operation failed: {0}")]
    SchemaOperation(#[source] DatabaseError),

    /// Attribute registry could not be loaded
    #[error("Attribute lookup failed: {0}")]
    Attributes(#[source] DatabaseError),

    /// Attribute id that is not an integer
    #[error("Attribute {code} has non-numeric id {value:?}")]
    InvalidAttributeId { code: String, value: String },

    /// A merge batch failed; earlier batches stay committed
    #[error("Merge batch {batch} failed: {source}")]
    Merge {
        batch: usize,
        #[source]
        source: DatabaseError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        let line = err
            .position()
            .map(|p| format!(" (line {})", p.line()))
            .unwrap_or_default();
        ImportError::SourceRead {
            path: PathBuf::new(),
            message: format!("{}{}", err, line),
        }
    }
}

impl ImportError {
    /// Attach the file path to a read error raised without one
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            ImportError::SourceRead { path: p, message } if p.as_os_str().is_empty() => {
                ImportError::SourceRead {
                    path: path.into(),
                    message,
                }
            }
            other => other,
        }
    }
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;
