//! Config command - show or edit configuration

use crate::classify::VolatilityClass;
use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::schema::UnmatchedPolicy;
use crate::config::{Config, ConfigManager};
use crate::error::{StratumError, StratumResult};
use crate::ui::{self, UiContext};
use tokio::fs;

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config) -> StratumResult<()> {
    let manager = ConfigManager::new();

    match args.action {
        None | Some(ConfigAction::Show) => show_config(config),
        Some(ConfigAction::Path) => show_path(&manager),
        Some(ConfigAction::Init { force }) => init_config(&manager, force).await?,
        Some(ConfigAction::Set { key, value, local }) => {
            if local {
                set_local_value(&key, &value).await?
            } else {
                set_value(&manager, config, &key, &value).await?
            }
        }
    }

    Ok(())
}

fn show_config(config: &Config) {
    let toml =
        toml::to_string_pretty(config).unwrap_or_else(|_| "Error serializing config".to_string());
    println!("{}", toml);
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> StratumResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    let config = Config::default();
    manager.save(&config).await?;

    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

async fn set_value(
    manager: &ConfigManager,
    config: &Config,
    key: &str,
    value: &str,
) -> StratumResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();

    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "verbose"] => config.general.verbose = parse_bool(value)?,
        ["general", "log_format"] => config.general.log_format = value.to_string(),

        ["scan", "dependency_dirs"] => config.scan.dependency_dirs = parse_list(value),
        ["scan", "resource_dirs"] => config.scan.resource_dirs = parse_list(value),
        ["scan", "application_dirs"] => config.scan.application_dirs = parse_list(value),
        ["scan", "snapshot_markers"] => config.scan.snapshot_markers = parse_list(value),
        ["scan", "unmatched"] => config.scan.unmatched = parse_unmatched(value)?,

        ["layout", "max_layers"] => config.layout.max_layers = parse_usize(value)?,
        ["layout", "max_layer_bytes"] => {
            config.layout.max_layer_bytes = Some(parse_u64(value)?)
        }
        ["layout", "volatility_order"] => {
            config.layout.volatility_order = parse_class_list(value)?
        }

        ["image", "base"] => config.image.base = value.to_string(),
        ["image", "entrypoint", "executable"] => {
            config.image.entrypoint.executable = value.to_string()
        }
        ["image", "entrypoint", "args"] => config.image.entrypoint.args = parse_list(value),
        ["image", "entrypoint", "options_env"] => {
            config.image.entrypoint.options_env = Some(value.to_string())
        }

        ["assembly", "backend"] => config.assembly.backend = value.to_string(),
        ["assembly", "build_command"] => config.assembly.build_command = value.to_string(),
        ["assembly", "tag"] => config.assembly.tag = Some(value.to_string()),

        ["cache", "enabled"] => config.cache.enabled = parse_bool(value)?,
        ["cache", "gc_days"] => config.cache.gc_days = parse_u32(value)?,

        _ => {
            ui::step_error_detail(&ctx, "Unknown config key", key);
            ui::remark(&ctx, "Valid keys:");
            print_valid_keys();
            return Ok(());
        }
    }

    manager.save(&config).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));

    Ok(())
}

async fn set_local_value(key: &str, value: &str) -> StratumResult<()> {
    let ctx = UiContext::detect();

    let cwd =
        std::env::current_dir().map_err(|e| StratumError::io("getting current directory", e))?;
    let local_path = cwd.join(".stratum.toml");

    // Validate the key before touching the file
    validate_config_key(key)?;

    // Load existing local config or start with an empty TOML table
    let mut doc: toml::Value = if local_path.exists() {
        let content = fs::read_to_string(&local_path)
            .await
            .map_err(|e| StratumError::io(format!("reading {}", local_path.display()), e))?;
        content
            .parse()
            .map_err(|e: toml::de::Error| StratumError::ConfigInvalid {
                path: local_path.clone(),
                reason: e.to_string(),
            })?
    } else {
        toml::Value::Table(toml::map::Map::new())
    };

    set_toml_value(&mut doc, key, value)?;

    // Write back only the keys the user has explicitly set
    let content = toml::to_string_pretty(&doc)?;
    fs::write(&local_path, content)
        .await
        .map_err(|e| StratumError::io(format!("writing {}", local_path.display()), e))?;

    ui::step_ok(
        &ctx,
        &format!("Set {} = {} in {}", key, value, local_path.display()),
    );

    Ok(())
}

/// Validate that a config key is one we recognise.
fn validate_config_key(key: &str) -> StratumResult<()> {
    let parts: Vec<&str> = key.split('.').collect();
    match parts.as_slice() {
        ["general", "verbose" | "log_format"]
        | ["scan", "dependency_dirs" | "resource_dirs" | "application_dirs" | "snapshot_markers" | "unmatched"]
        | ["layout", "max_layers" | "max_layer_bytes" | "volatility_order"]
        | ["image", "base"]
        | ["image", "entrypoint", "executable" | "args" | "options_env"]
        | ["assembly", "backend" | "build_command" | "tag"]
        | ["cache", "enabled" | "gc_days"] => Ok(()),
        _ => Err(StratumError::User(format!("Unknown config key: {}", key))),
    }
}

/// Set a dot-separated key in a TOML value tree, creating intermediate
/// tables as needed.
fn set_toml_value(doc: &mut toml::Value, key: &str, value: &str) -> StratumResult<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let mut current = doc;

    for &part in &parts[..parts.len() - 1] {
        current = current
            .as_table_mut()
            .ok_or_else(|| StratumError::User(format!("Expected table at key: {}", part)))?
            .entry(part)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    let leaf = parts.last().unwrap();
    let table = current
        .as_table_mut()
        .ok_or_else(|| StratumError::User(format!("Expected table for key: {}", key)))?;

    // Keys that store as arrays
    let is_list_key = key.ends_with("_dirs")
        || key.ends_with("_markers")
        || key.ends_with("volatility_order")
        || key.ends_with("args");

    let toml_value = if is_list_key {
        let items: Vec<toml::Value> = parse_list(value)
            .into_iter()
            .map(toml::Value::String)
            .collect();
        toml::Value::Array(items)
    } else if value == "true" || value == "false" {
        toml::Value::Boolean(value.parse().unwrap_or(false))
    } else if let Ok(n) = value.parse::<i64>() {
        toml::Value::Integer(n)
    } else {
        toml::Value::String(value.to_string())
    };

    table.insert((*leaf).to_string(), toml_value);
    Ok(())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_class_list(value: &str) -> StratumResult<Vec<VolatilityClass>> {
    parse_list(value)
        .iter()
        .map(|s| s.parse().map_err(StratumError::User))
        .collect()
}

fn parse_unmatched(value: &str) -> StratumResult<UnmatchedPolicy> {
    match value {
        "application-code" => Ok(UnmatchedPolicy::ApplicationCode),
        "resource" => Ok(UnmatchedPolicy::Resource),
        "reject" => Ok(UnmatchedPolicy::Reject),
        _ => Err(StratumError::User(format!(
            "Invalid unmatched policy: {}. Use application-code/resource/reject",
            value
        ))),
    }
}

fn parse_bool(value: &str) -> StratumResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(StratumError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_u32(value: &str) -> StratumResult<u32> {
    value
        .parse()
        .map_err(|_| StratumError::User(format!("Invalid number: {}", value)))
}

fn parse_u64(value: &str) -> StratumResult<u64> {
    value
        .parse()
        .map_err(|_| StratumError::User(format!("Invalid number: {}", value)))
}

fn parse_usize(value: &str) -> StratumResult<usize> {
    value
        .parse()
        .map_err(|_| StratumError::User(format!("Invalid number: {}", value)))
}

fn print_valid_keys() {
    let keys = [
        "general.verbose",
        "general.log_format",
        "scan.dependency_dirs",
        "scan.resource_dirs",
        "scan.application_dirs",
        "scan.snapshot_markers",
        "scan.unmatched",
        "layout.max_layers",
        "layout.max_layer_bytes",
        "layout.volatility_order",
        "image.base",
        "image.entrypoint.executable",
        "image.entrypoint.args",
        "image.entrypoint.options_env",
        "assembly.backend",
        "assembly.build_command",
        "assembly.tag",
        "cache.enabled",
        "cache.gc_days",
    ];

    for key in keys {
        eprintln!("  {}", key);
    }
}
