//! Stratum - Deterministic Container Image Layer Planner
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use stratum::cli::{Cli, Commands};
use stratum::config::ConfigManager;
use stratum::error::StratumResult;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> StratumResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("stratum=warn"),
        1 => EnvFilter::new("stratum=info"),
        _ => EnvFilter::new("stratum=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // Commands that don't need config loading
    match cli.command {
        Commands::Init(args) => return stratum::cli::commands::init(args).await,
        Commands::Completions { shell } => {
            stratum::cli::commands::completions(shell);
            return Ok(());
        }
        _ => {}
    }

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        debug!("Local config discovery disabled (--no-local)");
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| stratum::error::StratumError::io("getting current directory", e))?;
        let found = ConfigManager::find_local_config(&cwd);
        if let Some(ref path) = found {
            debug!("Found local config: {}", path.display());
        }
        found
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    // Ensure state directories exist
    ConfigManager::ensure_state_dirs().await?;

    // Dispatch to command
    match cli.command {
        Commands::Init(_) | Commands::Completions { .. } => unreachable!("handled above"),
        Commands::Plan(args) => stratum::cli::commands::plan(args, &config).await,
        Commands::Assemble(args) => stratum::cli::commands::assemble(args, &config).await,
        Commands::Classify(args) => stratum::cli::commands::classify(args, &config).await,
        Commands::Cache(args) => stratum::cli::commands::cache(args, &config).await,
        Commands::Config(args) => stratum::cli::commands::config(args, &config).await,
    }
}
