//! Delimited source file reading
//!
//! Thin wrapper over the `csv` reader that yields the header row and one
//! [`Row`] per data line. Values are kept as raw text.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::database::Row;
use crate::error::{ImportError, ImportResult};

/// Column every source file must carry
pub const KEY_COLUMN: &str = "code";

const UTF8_BOM: char = '\u{feff}';

/// Delimiter/enclosure settings of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
    pub delimiter: u8,
    pub enclosure: u8,
}

impl Default for SourceFormat {
    fn default() -> Self {
        Self {
            delimiter: b';',
            enclosure: b'"',
        }
    }
}

/// An open delimited file positioned after its header row
pub struct TabularSource {
    path: PathBuf,
    headers: Vec<String>,
    reader: csv::Reader<File>,
}

impl std::fmt::Debug for TabularSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabularSource")
            .field("path", &self.path)
            .field("headers", &self.headers)
            .finish()
    }
}

impl TabularSource {
    /// Open a file and read its header row
    ///
    /// # Returns
    /// `SourceNotFound` if `path` is not a regular file or cannot be opened
    pub fn open(path: &Path, format: SourceFormat) -> ImportResult<Self> {
        if !path.is_file() {
            return Err(ImportError::SourceNotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Source file is not readable");
            ImportError::SourceNotFound(path.to_path_buf())
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(format.delimiter)
            .quote(format.enclosure)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| ImportError::from(e).with_path(path))?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches(UTF8_BOM).to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();
        let headers = validate_headers(headers)?;

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            reader,
        })
    }

    /// Header columns in file order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Iterate over data rows
    ///
    /// Short records are padded with NULL; records with more fields than the
    /// header are an error.
    pub fn rows(&mut self) -> impl Iterator<Item = ImportResult<Row>> + '_ {
        let headers = &self.headers;
        let path = &self.path;
        self.reader.records().map(move |record| {
            let record = record.map_err(|e| ImportError::from(e).with_path(path))?;
            if record.len() > headers.len() {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                return Err(ImportError::SourceRead {
                    path: path.clone(),
                    message: format!(
                        "line {} has {} fields but the header has {}",
                        line,
                        record.len(),
                        headers.len()
                    ),
                });
            }
            Ok(headers
                .iter()
                .enumerate()
                .map(|(i, column)| (column.clone(), record.get(i).map(str::to_string)))
                .collect())
        })
    }
}

fn validate_headers(headers: Vec<String>) -> ImportResult<Vec<String>> {
    if let Some(position) = headers.iter().position(|h| h.trim().is_empty()) {
        return Err(ImportError::InvalidHeader(format!(
            "column {} has an empty name",
            position + 1
        )));
    }

    let mut seen = std::collections::HashSet::new();
    if let Some(duplicate) = headers.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(ImportError::InvalidHeader(format!(
            "duplicate column {}",
            duplicate
        )));
    }

    if !headers.iter().any(|h| h == KEY_COLUMN) {
        return Err(ImportError::InvalidHeader(format!(
            "missing required column {}",
            KEY_COLUMN
        )));
    }

    Ok(headers)
}
