//! Config command: write or print `.variant-import.toml`

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::database::config::{CONFIG_FILENAME, ImportConfig, sample_config};

/// Config init arguments
#[derive(Debug, Clone)]
pub struct ConfigInitArgs {
    pub workspace: PathBuf,
    /// Overwrite an existing file
    pub force: bool,
}

/// Config show arguments
#[derive(Debug, Clone)]
pub struct ConfigShowArgs {
    pub workspace: PathBuf,
}

/// Write the commented sample configuration into the workspace
pub fn handle_config_init(args: &ConfigInitArgs) -> Result<(), CliError> {
    if !args.workspace.is_dir() {
        return Err(CliError::FileNotFound(args.workspace.clone()));
    }
    if ImportConfig::exists(&args.workspace) && !args.force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists in {}. Use --force to overwrite.",
            CONFIG_FILENAME,
            args.workspace.display()
        )));
    }

    let path = args.workspace.join(CONFIG_FILENAME);
    std::fs::write(&path, sample_config())
        .map_err(|e| CliError::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Print the effective configuration, env overrides included
pub fn handle_config_show(args: &ConfigShowArgs) -> Result<(), CliError> {
    let config = ImportConfig::load(&args.workspace)?;
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let workspace = TempDir::new().unwrap();
        let args = ConfigInitArgs {
            workspace: workspace.path().to_path_buf(),
            force: false,
        };
        handle_config_init(&args).unwrap();
        assert!(ImportConfig::exists(workspace.path()));

        let content = std::fs::read_to_string(workspace.path().join(CONFIG_FILENAME)).unwrap();
        let config = ImportConfig::parse(&content).unwrap();
        assert_eq!(config.import.batch_size, 500);

        assert!(matches!(
            handle_config_init(&args),
            Err(CliError::InvalidArgument(_))
        ));
        handle_config_init(&ConfigInitArgs {
            force: true,
            ..args
        })
        .unwrap();
    }
}
