//! Command-line front end for variant imports

pub mod commands;
pub mod error;

pub use error::CliError;
