//! Assemble command - drive a build plan through the backend

use crate::assemble::{create_backend, run_assembly, AssemblyOptions};
use crate::cache::CacheStore;
use crate::cli::args::AssembleArgs;
use crate::cli::commands::plan::{compute_plan, resolve_project_dir};
use crate::config::{Config, ConfigManager};
use crate::error::{StratumError, StratumResult};
use crate::plan::BuildPlan;
use crate::ui::{self, AssemblyProgress, TaskSpinner, UiContext};
use std::sync::atomic::Ordering;
use tracing::debug;

/// Execute the assemble command
pub async fn execute(args: AssembleArgs, config: &Config) -> StratumResult<()> {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Stratum Assemble");

    let project_dir = resolve_project_dir(args.project.as_deref())?;

    let mut config = config.clone();
    if let Some(ref backend) = args.backend {
        config.assembly.backend = backend.clone();
    }
    if let Some(ref tag) = args.tag {
        config.assembly.tag = Some(tag.clone());
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Computing build plan...");

    let plan = match load_or_compute_plan(&args, &config, &project_dir).await {
        Ok(plan) => plan,
        Err(e) => {
            spinner.stop_error("Planning failed");
            return Err(e);
        }
    };
    spinner.stop(&format!(
        "Planned {} layer(s) onto {}",
        plan.layers.len(),
        plan.base_image
    ));

    let backend = create_backend(&config)?;
    if !backend.is_available().await? {
        return Err(StratumError::BackendUnavailable {
            name: backend.name().to_string(),
        });
    }
    debug!("Using backend: {}", backend.name());

    let mut store = CacheStore::open(ConfigManager::records_path()).await?;

    let opts = AssemblyOptions {
        use_cache: config.cache.enabled && !args.no_cache,
        ..AssemblyOptions::default()
    };

    // Honor Ctrl-C at layer boundaries
    let cancel = opts.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let progress = AssemblyProgress::new(&ctx, plan.layers.len());
    let result = run_assembly(
        backend.as_ref(),
        &plan,
        &mut store,
        &project_dir,
        &opts,
        &|layer, reused| progress.on_layer(layer, reused),
        &|line| progress.on_build_line(line),
    )
    .await;
    progress.finish();

    let report = result?;

    ui::step_info(
        &ctx,
        &format!(
            "{} layer(s) reused, {} materialized",
            report.reused(),
            report.materialized()
        ),
    );
    ui::outro_success(&ctx, &format!("Image assembled: {}", report.image));

    Ok(())
}

async fn load_or_compute_plan(
    args: &AssembleArgs,
    config: &Config,
    project_dir: &std::path::Path,
) -> StratumResult<BuildPlan> {
    match args.plan {
        Some(ref path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| StratumError::io(format!("reading plan {}", path.display()), e))?;
            BuildPlan::from_json(&content)
        }
        None => {
            compute_plan(
                project_dir,
                config,
                args.base_image.as_deref(),
                args.entrypoint.as_deref(),
                None,
                None,
            )
            .await
        }
    }
}
