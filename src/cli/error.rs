//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::database::DatabaseError;
use crate::error::ImportError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Import error: {0}")]
    ImportError(#[from] ImportError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Import aborted: {0}")]
    Aborted(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(String),
}
