//! Import configuration file support
//!
//! Handles parsing of `.variant-import.toml` configuration files and
//! environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{DatabaseError, DatabaseResult};

/// Default database filename for DuckDB
pub const DEFAULT_DUCKDB_FILENAME: &str = ".variant-import.duckdb";

/// Default configuration filename
pub const CONFIG_FILENAME: &str = ".variant-import.toml";

/// Environment variable for database backend
pub const ENV_DB_BACKEND: &str = "VARIANT_IMPORT_DB_BACKEND";

/// Environment variable for DuckDB path
pub const ENV_DUCKDB_PATH: &str = "VARIANT_IMPORT_DUCKDB_PATH";

/// Environment variable for merge batch size
pub const ENV_BATCH_SIZE: &str = "VARIANT_IMPORT_BATCH_SIZE";

/// Environment variable for the attribute entity type scope
pub const ENV_ENTITY_TYPE_ID: &str = "VARIANT_IMPORT_ENTITY_TYPE_ID";

/// Database backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackendType {
    /// DuckDB embedded database (default)
    #[default]
    DuckDB,
    /// In-process tables, discarded at exit
    Memory,
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(DatabaseBackendType::DuckDB),
            "memory" => Ok(DatabaseBackendType::Memory),
            _ => Err(format!(
                "Unknown database backend: {}. Use 'duckdb' or 'memory'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::DuckDB => write!(f, "duckdb"),
            DatabaseBackendType::Memory => write!(f, "memory"),
        }
    }
}

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Database backend type
    #[serde(default)]
    pub backend: DatabaseBackendType,

    /// Path to DuckDB database file (relative to workspace)
    #[serde(default = "default_duckdb_path")]
    pub path: String,
}

fn default_duckdb_path() -> String {
    DEFAULT_DUCKDB_FILENAME.to_string()
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            backend: DatabaseBackendType::default(),
            path: default_duckdb_path(),
        }
    }
}

/// Import run configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSection {
    /// Import code; the staging table is named `tmp_<code>`
    #[serde(default = "default_code")]
    pub code: String,

    /// Destination entity table
    #[serde(default = "default_destination_table")]
    pub destination_table: String,

    /// Table holding `attribute_code`/`attribute_id`/`entity_type_id`
    #[serde(default = "default_attribute_table")]
    pub attribute_table: String,

    /// Entity type scope of the attribute registry
    #[serde(default = "default_entity_type_id")]
    pub entity_type_id: i64,

    /// Rows per upsert batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Drop every dynamic destination column before adding the current ones
    #[serde(default = "default_true")]
    pub rebuild_schema: bool,

    /// Leave the staging table behind when a run fails
    #[serde(default)]
    pub keep_staging_on_error: bool,
}

fn default_code() -> String {
    "variant".to_string()
}

fn default_destination_table() -> String {
    "pimgento_variant".to_string()
}

fn default_attribute_table() -> String {
    "eav_attribute".to_string()
}

fn default_entity_type_id() -> i64 {
    4
}

fn default_batch_size() -> usize {
    500
}

fn default_true() -> bool {
    true
}

impl Default for ImportSection {
    fn default() -> Self {
        Self {
            code: default_code(),
            destination_table: default_destination_table(),
            attribute_table: default_attribute_table(),
            entity_type_id: default_entity_type_id(),
            batch_size: default_batch_size(),
            rebuild_schema: true,
            keep_staging_on_error: false,
        }
    }
}

/// Source file format section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    /// Field delimiter (single byte)
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Field enclosure / quote character (single byte)
    #[serde(default = "default_enclosure")]
    pub enclosure: String,
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_enclosure() -> String {
    "\"".to_string()
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            enclosure: default_enclosure(),
        }
    }
}

impl SourceSection {
    /// Delimiter as a byte
    pub fn delimiter_byte(&self) -> DatabaseResult<u8> {
        single_byte("delimiter", &self.delimiter)
    }

    /// Enclosure as a byte
    pub fn enclosure_byte(&self) -> DatabaseResult<u8> {
        single_byte("enclosure", &self.enclosure)
    }
}

fn single_byte(field: &str, value: &str) -> DatabaseResult<u8> {
    match value.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(DatabaseError::ConfigError(format!(
            "source.{} must be a single byte, got {:?}",
            field, value
        ))),
    }
}

/// Main configuration structure
///
/// Represents the `.variant-import.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseSection,

    /// Import run configuration
    #[serde(default)]
    pub import: ImportSection,

    /// Source file format
    #[serde(default)]
    pub source: SourceSection,
}

impl ImportConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory configuration
    pub fn memory() -> Self {
        Self {
            database: DatabaseSection {
                backend: DatabaseBackendType::Memory,
                path: String::new(),
            },
            ..Default::default()
        }
    }

    /// Load configuration from a workspace directory
    ///
    /// Looks for `.variant-import.toml` in the workspace directory.
    /// Falls back to defaults if not found.
    pub fn load(workspace_path: &Path) -> DatabaseResult<Self> {
        let config_path = workspace_path.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| DatabaseError::IoError(format!("Failed to read config: {}", e)))?;

            Self::parse(&content)?
        } else {
            Self::default()
        };

        // Apply environment variable overrides
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> DatabaseResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DatabaseError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a workspace directory
    pub fn save(&self, workspace_path: &Path) -> DatabaseResult<()> {
        let config_path = workspace_path.join(CONFIG_FILENAME);
        let content = self.to_toml()?;

        std::fs::write(&config_path, content)
            .map_err(|e| DatabaseError::IoError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> DatabaseResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            DatabaseError::SerializationError(format!("Failed to serialize config: {}", e))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Backend type
        if let Ok(backend) = std::env::var(ENV_DB_BACKEND)
            && let Ok(backend_type) = backend.parse()
        {
            self.database.backend = backend_type;
        }

        // DuckDB path
        if let Ok(path) = std::env::var(ENV_DUCKDB_PATH) {
            self.database.path = path;
        }

        if let Ok(size) = std::env::var(ENV_BATCH_SIZE)
            && let Ok(size) = size.parse()
        {
            self.import.batch_size = size;
        }

        if let Ok(id) = std::env::var(ENV_ENTITY_TYPE_ID)
            && let Ok(id) = id.parse()
        {
            self.import.entity_type_id = id;
        }
    }

    /// Reject values no run can work with
    pub fn validate(&self) -> DatabaseResult<()> {
        if self.import.batch_size == 0 {
            return Err(DatabaseError::ConfigError(
                "import.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.import.code.trim().is_empty() {
            return Err(DatabaseError::ConfigError(
                "import.code must not be empty".to_string(),
            ));
        }
        if self.import.destination_table.trim().is_empty() {
            return Err(DatabaseError::ConfigError(
                "import.destination_table must not be empty".to_string(),
            ));
        }
        self.source.delimiter_byte()?;
        self.source.enclosure_byte()?;
        Ok(())
    }

    /// Name of the staging table for this import code
    pub fn staging_table(&self) -> String {
        format!("tmp_{}", self.import.code)
    }

    /// Get the DuckDB database path for a workspace
    pub fn get_duckdb_path(&self, workspace_path: &Path) -> PathBuf {
        if self.database.path.is_empty() {
            workspace_path.join(DEFAULT_DUCKDB_FILENAME)
        } else if Path::new(&self.database.path).is_absolute() {
            PathBuf::from(&self.database.path)
        } else {
            workspace_path.join(&self.database.path)
        }
    }

    /// Check if configuration exists in a workspace
    pub fn exists(workspace_path: &Path) -> bool {
        workspace_path.join(CONFIG_FILENAME).exists()
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Variant import configuration

[database]
# Database backend: "duckdb" (default) or "memory"
backend = "duckdb"

# Path to DuckDB database file (relative to workspace, or absolute)
path = ".variant-import.duckdb"

[import]
# Import code; the staging table is named tmp_<code>
code = "variant"
destination_table = "pimgento_variant"
attribute_table = "eav_attribute"
# Entity type whose attribute codes resolve axis values
entity_type_id = 4
batch_size = 500
# Drop all dynamic destination columns before adding the current ones
rebuild_schema = true
keep_staging_on_error = false

[source]
delimiter = ";"
enclosure = "\""
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ImportConfig::new();
        assert_eq!(config.database.backend, DatabaseBackendType::DuckDB);
        assert_eq!(config.database.path, DEFAULT_DUCKDB_FILENAME);
        assert_eq!(config.import.batch_size, 500);
        assert_eq!(config.import.entity_type_id, 4);
        assert!(config.import.rebuild_schema);
        assert!(!config.import.keep_staging_on_error);
        assert_eq!(config.staging_table(), "tmp_variant");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
backend = "memory"

[import]
code = "family_variant"
batch_size = 100
rebuild_schema = false

[source]
delimiter = ","
"#;
        let config = ImportConfig::parse(toml).unwrap();
        assert_eq!(config.database.backend, DatabaseBackendType::Memory);
        assert_eq!(config.import.code, "family_variant");
        assert_eq!(config.import.batch_size, 100);
        assert!(!config.import.rebuild_schema);
        assert_eq!(config.import.destination_table, "pimgento_variant");
        assert_eq!(config.source.delimiter_byte().unwrap(), b',');
        assert_eq!(config.source.enclosure_byte().unwrap(), b'"');
        assert_eq!(config.staging_table(), "tmp_family_variant");
    }

    #[test]
    fn test_parse_rejects_zero_batch_size() {
        let err = ImportConfig::parse("[import]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, DatabaseError::ConfigError(_)));
    }

    #[test]
    fn test_parse_rejects_multi_byte_delimiter() {
        let err = ImportConfig::parse("[source]\ndelimiter = \";;\"\n").unwrap_err();
        assert!(err.to_string().contains("delimiter"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let mut config = ImportConfig::new();
        config.database.path = "imports.duckdb".to_string();

        config.save(dir.path()).unwrap();
        assert!(ImportConfig::exists(dir.path()));

        let loaded = ImportConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.database.path, "imports.duckdb");
    }

    #[test]
    fn test_get_duckdb_path() {
        let mut config = ImportConfig::new();
        config.database.path = "relative.duckdb".to_string();
        let workspace = Path::new("/workspace");
        assert_eq!(
            config.get_duckdb_path(workspace),
            PathBuf::from("/workspace/relative.duckdb")
        );
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!(
            "duckdb".parse::<DatabaseBackendType>().unwrap(),
            DatabaseBackendType::DuckDB
        );
        assert_eq!(
            "MEMORY".parse::<DatabaseBackendType>().unwrap(),
            DatabaseBackendType::Memory
        );
        assert!("postgres".parse::<DatabaseBackendType>().is_err());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = ImportConfig::parse(sample_config()).unwrap();
        assert_eq!(config.import.destination_table, "pimgento_variant");
    }
}
