//! Plan command - compute and emit a build plan

use crate::classify::scan_tree;
use crate::cli::args::PlanArgs;
use crate::config::Config;
use crate::error::{StratumError, StratumResult};
use crate::plan::{emit_plan, partition_layers, BuildPlan};
use crate::ui::{self, UiContext};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the plan command
pub async fn execute(args: PlanArgs, config: &Config) -> StratumResult<()> {
    let project_dir = resolve_project_dir(args.project.as_deref())?;
    debug!("Planning from {}", project_dir.display());

    let plan = compute_plan(
        &project_dir,
        config,
        args.base_image.as_deref(),
        args.entrypoint.as_deref(),
        args.max_layers,
        args.max_layer_bytes,
    )
    .await?;

    let json = plan.to_json()?;

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, &json)
                .await
                .map_err(|e| StratumError::io(format!("writing plan to {}", path.display()), e))?;

            let ctx = UiContext::detect();
            ui::step_ok_detail(&ctx, "Build plan written", &path.display().to_string());
            for layer in &plan.layers {
                ui::key_value(
                    &ctx,
                    &format!("layer {}", layer.order_index),
                    &format!(
                        "{} ({} files, {})",
                        layer.class,
                        layer.entries.len(),
                        layer.short_digest()
                    ),
                );
            }
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Resolve the build output directory, defaulting to the current directory
pub(crate) fn resolve_project_dir(project: Option<&Path>) -> StratumResult<PathBuf> {
    match project {
        Some(p) => Ok(p.to_path_buf()),
        None => std::env::current_dir()
            .map_err(|e| StratumError::io("getting current directory", e)),
    }
}

/// Run the full planning pipeline: scan, partition, emit.
///
/// CLI overrides take precedence over the merged configuration.
pub(crate) async fn compute_plan(
    project_dir: &Path,
    config: &Config,
    base_image: Option<&str>,
    entrypoint: Option<&str>,
    max_layers: Option<usize>,
    max_layer_bytes: Option<u64>,
) -> StratumResult<BuildPlan> {
    let rules = config.scan.rules();
    let entries = scan_tree(project_dir, &rules).await?;

    let mut policy = config.layout.policy();
    if let Some(n) = max_layers {
        policy.max_layers = n;
    }
    if let Some(bytes) = max_layer_bytes {
        policy.max_layer_bytes = Some(bytes);
    }

    let layers = partition_layers(entries, &policy)?;

    let base = base_image.unwrap_or(&config.image.base);
    let mut spec = config.image.entrypoint.spec();
    if let Some(executable) = entrypoint {
        spec.executable = executable.to_string();
    }

    emit_plan(layers, base, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::VolatilityClass;
    use tempfile::TempDir;

    fn write_tree(root: &Path) {
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::create_dir_all(root.join("classes/bin")).unwrap();
        std::fs::write(root.join("lib/dep-1.0.jar"), b"dep").unwrap();
        std::fs::write(root.join("lib/core-1.0-SNAPSHOT.jar"), b"snap").unwrap();
        std::fs::write(root.join("classes/bin/run"), b"#!/bin/sh").unwrap();
    }

    #[tokio::test]
    async fn compute_plan_from_tree() {
        let temp = TempDir::new().unwrap();
        write_tree(temp.path());

        let config = Config::default();
        let plan = compute_plan(
            temp.path(),
            &config,
            Some("temurin:21-jre"),
            Some("classes/bin/run"),
            None,
            None,
        )
        .await
        .unwrap();

        // Empty resource class is omitted
        assert_eq!(plan.layers.len(), 3);
        assert_eq!(plan.layers[0].class, VolatilityClass::FixedDependency);
        assert_eq!(plan.layers[1].class, VolatilityClass::SnapshotDependency);
        assert_eq!(plan.layers[2].class, VolatilityClass::ApplicationCode);
    }

    #[tokio::test]
    async fn cli_overrides_apply() {
        let temp = TempDir::new().unwrap();
        write_tree(temp.path());

        let config = Config::default();
        let result = compute_plan(
            temp.path(),
            &config,
            Some("temurin:21-jre"),
            Some("classes/bin/run"),
            Some(1),
            None,
        )
        .await;

        // 3 non-empty classes cannot fit into one layer
        assert!(matches!(result, Err(StratumError::PolicyViolation { .. })));
    }

    #[tokio::test]
    async fn replanning_is_deterministic() {
        let temp = TempDir::new().unwrap();
        write_tree(temp.path());

        let config = Config::default();
        let first = compute_plan(
            temp.path(),
            &config,
            Some("temurin:21-jre"),
            Some("classes/bin/run"),
            None,
            None,
        )
        .await
        .unwrap();
        let second = compute_plan(
            temp.path(),
            &config,
            Some("temurin:21-jre"),
            Some("classes/bin/run"),
            None,
            None,
        )
        .await
        .unwrap();

        let first_digests: Vec<&str> = first
            .layers
            .iter()
            .map(|l| l.content_digest.as_str())
            .collect();
        let second_digests: Vec<&str> = second
            .layers
            .iter()
            .map(|l| l.content_digest.as_str())
            .collect();
        assert_eq!(first_digests, second_digests);
        assert_eq!(first.image_tag(), second.image_tag());
    }

    #[tokio::test]
    async fn editing_app_code_only_touches_app_layer() {
        let temp = TempDir::new().unwrap();
        write_tree(temp.path());

        let config = Config::default();
        let before = compute_plan(
            temp.path(),
            &config,
            Some("temurin:21-jre"),
            Some("classes/bin/run"),
            None,
            None,
        )
        .await
        .unwrap();

        std::fs::write(temp.path().join("classes/bin/run"), b"#!/bin/sh\nedited").unwrap();

        let after = compute_plan(
            temp.path(),
            &config,
            Some("temurin:21-jre"),
            Some("classes/bin/run"),
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(before.layers[0].content_digest, after.layers[0].content_digest);
        assert_eq!(before.layers[1].content_digest, after.layers[1].content_digest);
        assert_ne!(before.layers[2].content_digest, after.layers[2].content_digest);
    }
}
