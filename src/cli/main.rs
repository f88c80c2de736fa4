//! CLI binary entry point for variant-import

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use variant_import::cli::commands::config::{
    ConfigInitArgs, ConfigShowArgs, handle_config_init, handle_config_show,
};
#[cfg(feature = "cli")]
use variant_import::cli::commands::run::{OutputFormat, RunArgs, handle_run};
#[cfg(feature = "cli")]
use variant_import::cli::error::CliError;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "variant-import")]
#[command(about = "Import variant axis records into a dynamic-schema table")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Stage, reconcile and merge one variant file
    Run {
        /// Delimited variant file
        file: PathBuf,
        /// Workspace path (default: current directory)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Use the memory backend; nothing is persisted
        #[arg(long)]
        in_memory: bool,
    },

    /// Manage the workspace configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a sample .variant-import.toml
    Init {
        /// Workspace path (default: current directory)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        /// Workspace path (default: current directory)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
}

#[cfg(feature = "cli")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Run {
            file,
            workspace,
            format,
            in_memory,
        } => format.parse::<OutputFormat>().and_then(|format| {
            let args = RunArgs {
                file,
                workspace,
                format,
                in_memory,
            };
            handle_run(&args)
        }),

        Commands::Config { command } => match command {
            ConfigCommands::Init { workspace, force } => {
                handle_config_init(&ConfigInitArgs { workspace, force })
            }
            ConfigCommands::Show { workspace } => handle_config_show(&ConfigShowArgs { workspace }),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
