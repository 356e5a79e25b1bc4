//! Init command - create project-local .stratum.toml

use crate::cli::args::InitArgs;
use crate::error::{StratumError, StratumResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

/// Template for project-local config
const INIT_TEMPLATE: &str = r#"# Stratum project configuration
# Settings here override your global config (~/.config/stratum/config.toml)

[image]
# base = "docker.io/library/eclipse-temurin:21-jre"

[image.entrypoint]
# executable = "classes/bin/run"
# args = ["--server", "{}"]
# options_env = "JAVA_TOOL_OPTIONS"

[layout]
# max_layers = 4
# max_layer_bytes = 104857600
# volatility_order = ["fixed-dependency", "snapshot-dependency", "resource", "application-code"]

[scan]
# dependency_dirs = ["lib", "libs", "dependencies"]
# resource_dirs = ["resources", "res", "static"]
# unmatched = "application-code"   # application-code, resource, reject

[assembly]
# backend = "dockerfile"
# build_command = "podman"
"#;

/// Execute the init command
pub async fn execute(args: InitArgs) -> StratumResult<()> {
    let ctx = UiContext::detect();

    let target_dir = match args.path {
        Some(ref p) => p.clone(),
        None => std::env::current_dir()
            .map_err(|e| StratumError::io("getting current directory", e))?,
    };

    let config_path = target_dir.join(".stratum.toml");

    if config_path.exists() && !args.force {
        return Err(StratumError::User(format!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if !target_dir.exists() {
        fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| StratumError::io(format!("creating directory {}", target_dir.display()), e))?;
    }

    fs::write(&config_path, INIT_TEMPLATE)
        .await
        .map_err(|e| StratumError::io(format!("writing {}", config_path.display()), e))?;

    ui::step_ok_detail(
        &ctx,
        "Created project config",
        &config_path.display().to_string(),
    );

    Ok(())
}
