//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Stratum - Deterministic container image layer planner
///
/// Partitions a build output tree into ordered, content-addressed
/// filesystem layers and hands the plan to an image assembly backend.
#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STRATUM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .stratum.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute a build plan and emit it as JSON
    Plan(PlanArgs),

    /// Assemble an image from a build plan
    Assemble(AssembleArgs),

    /// Show how files in a build tree classify
    Classify(ClassifyArgs),

    /// Manage the layer artifact cache
    Cache(CacheArgs),

    /// Initialize a project-local .stratum.toml config
    Init(InitArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Arguments for the plan command
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Build output directory to plan from (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Base image reference (overrides config)
    #[arg(long)]
    pub base_image: Option<String>,

    /// Entrypoint executable path within the tree (overrides config)
    #[arg(long)]
    pub entrypoint: Option<String>,

    /// Maximum number of layers (overrides config)
    #[arg(long)]
    pub max_layers: Option<usize>,

    /// Maximum bytes per layer (overrides config)
    #[arg(long)]
    pub max_layer_bytes: Option<u64>,

    /// Write the plan to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the assemble command
#[derive(Parser, Debug)]
pub struct AssembleArgs {
    /// Build output directory to plan from (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Use a previously emitted plan file instead of replanning
    #[arg(long, conflicts_with_all = ["base_image", "entrypoint"])]
    pub plan: Option<PathBuf>,

    /// Assembly backend to use (overrides config)
    #[arg(long)]
    pub backend: Option<String>,

    /// Image tag (defaults to a content-addressed tag)
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Ignore cached layer artifacts for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Base image reference (overrides config)
    #[arg(long)]
    pub base_image: Option<String>,

    /// Entrypoint executable path within the tree (overrides config)
    #[arg(long)]
    pub entrypoint: Option<String>,
}

/// Arguments for the classify command
#[derive(Parser, Debug)]
pub struct ClassifyArgs {
    /// Build output directory to scan (defaults to current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached layer artifacts
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove cached layers older than the retention window
    Gc {
        /// Remove layers older than N days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear all cached layer artifacts and records
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite existing .stratum.toml
    #[arg(short, long)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., layout.max_layers)
        key: String,
        /// Value to set
        value: String,
        /// Write to project-local .stratum.toml instead of global config
        #[arg(long)]
        local: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_plan() {
        let cli = Cli::parse_from([
            "stratum",
            "plan",
            "--base-image",
            "temurin:21-jre",
            "--max-layers",
            "6",
        ]);
        match cli.command {
            Commands::Plan(args) => {
                assert_eq!(args.base_image.as_deref(), Some("temurin:21-jre"));
                assert_eq!(args.max_layers, Some(6));
                assert!(args.output.is_none());
            }
            _ => panic!("expected Plan command"),
        }
    }

    #[test]
    fn cli_parses_assemble() {
        let cli = Cli::parse_from(["stratum", "assemble", "--no-cache", "-t", "myapp:1"]);
        match cli.command {
            Commands::Assemble(args) => {
                assert!(args.no_cache);
                assert_eq!(args.tag.as_deref(), Some("myapp:1"));
            }
            _ => panic!("expected Assemble command"),
        }
    }

    #[test]
    fn assemble_plan_conflicts_with_overrides() {
        let result = Cli::try_parse_from([
            "stratum",
            "assemble",
            "--plan",
            "plan.json",
            "--base-image",
            "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_classify_format() {
        let cli = Cli::parse_from(["stratum", "classify", "--format", "json"]);
        match cli.command {
            Commands::Classify(args) => {
                assert!(matches!(args.format, OutputFormat::Json));
            }
            _ => panic!("expected Classify command"),
        }
    }

    #[test]
    fn cli_parses_cache_gc() {
        let cli = Cli::parse_from(["stratum", "cache", "gc", "--days", "7", "--dry-run"]);
        match cli.command {
            Commands::Cache(args) => match args.action {
                CacheAction::Gc { days, dry_run } => {
                    assert_eq!(days, Some(7));
                    assert!(dry_run);
                }
                _ => panic!("expected Gc action"),
            },
            _ => panic!("expected Cache command"),
        }
    }

    #[test]
    fn cli_parses_init_force() {
        let cli = Cli::parse_from(["stratum", "init", "--force"]);
        match cli.command {
            Commands::Init(args) => assert!(args.force),
            _ => panic!("expected Init command"),
        }
    }

    #[test]
    fn cli_parses_config_set() {
        let cli = Cli::parse_from(["stratum", "config", "set", "layout.max_layers", "8"]);
        match cli.command {
            Commands::Config(args) => match args.action {
                Some(ConfigAction::Set { key, value, local }) => {
                    assert_eq!(key, "layout.max_layers");
                    assert_eq!(value, "8");
                    assert!(!local);
                }
                _ => panic!("expected Set action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn cli_no_local_flag() {
        let cli = Cli::parse_from(["stratum", "--no-local", "config", "path"]);
        assert!(cli.no_local);
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["stratum", "config", "show"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["stratum", "-vv", "config", "show"]);
        assert_eq!(cli.verbose, 2);
    }
}
