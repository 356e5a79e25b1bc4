//! Dockerfile reference backend
//!
//! Stages each layer into a content-addressed directory, generates a
//! Dockerfile with one COPY instruction per layer (build cache
//! granularity follows layer order), and drives the configured build
//! tool. The staged directories double as the cache artifacts: a digest
//! that is already staged never gets copied again.

use crate::assemble::backend::{ImageBackend, LayerArtifact};
use crate::assemble::{build_error_output, stream_child_output};
use crate::config::Config;
use crate::error::{StratumError, StratumResult};
use crate::plan::{BuildPlan, Layer};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Directory inside the image where layers are applied
const IMAGE_APP_ROOT: &str = "/app";

/// Backend that assembles images through a generated Dockerfile
pub struct DockerfileBackend {
    layers_dir: PathBuf,
    builds_dir: PathBuf,
    build_command: String,
    tag: Option<String>,
}

impl DockerfileBackend {
    /// Create a backend with explicit directories (used by tests)
    pub fn new(
        layers_dir: PathBuf,
        builds_dir: PathBuf,
        build_command: String,
        tag: Option<String>,
    ) -> Self {
        Self {
            layers_dir,
            builds_dir,
            build_command,
            tag,
        }
    }

    /// Create a backend from configuration and the standard state dirs
    pub fn from_config(config: &Config) -> Self {
        use crate::config::ConfigManager;
        Self::new(
            ConfigManager::layers_dir(),
            ConfigManager::builds_dir(),
            config.assembly.build_command.clone(),
            config.assembly.tag.clone(),
        )
    }
}

#[async_trait]
impl ImageBackend for DockerfileBackend {
    fn name(&self) -> &'static str {
        "dockerfile"
    }

    async fn is_available(&self) -> StratumResult<bool> {
        let result = Command::new(&self.build_command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) => Ok(status.success()),
            Err(_) => Ok(false),
        }
    }

    async fn materialize_layer(&self, tree_root: &Path, layer: &Layer) -> StratumResult<String> {
        let staged = self.layers_dir.join(&layer.content_digest);
        if staged.exists() {
            debug!("Layer {} already staged", layer.short_digest());
            return Ok(staged.display().to_string());
        }

        // Stage into a temp dir, then rename so the content-addressed
        // directory appears atomically
        let tmp = self
            .layers_dir
            .join(format!(".staging-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&tmp)
            .await
            .map_err(|e| StratumError::io("creating layer staging directory", e))?;

        for entry in &layer.entries {
            let src = tree_root.join(&entry.path);
            let dst = tmp.join(&entry.path);
            if let Some(parent) = dst.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StratumError::io("creating staging subdirectory", e))?;
            }
            tokio::fs::copy(&src, &dst).await.map_err(|e| {
                StratumError::io(format!("staging {} into layer", entry.path), e)
            })?;
        }

        if let Err(e) = tokio::fs::rename(&tmp, &staged).await {
            // A concurrent build may have staged the same digest first;
            // that is a win, not an error
            let _ = tokio::fs::remove_dir_all(&tmp).await;
            if !staged.exists() {
                return Err(StratumError::io("publishing staged layer", e));
            }
        }

        debug!("Staged layer {} ({} files)", layer.short_digest(), layer.entries.len());
        Ok(staged.display().to_string())
    }

    async fn assemble_image(
        &self,
        plan: &BuildPlan,
        artifacts: &[LayerArtifact],
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> StratumResult<String> {
        let context = self.builds_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&context)
            .await
            .map_err(|e| StratumError::io("creating build context", e))?;

        for (layer, artifact) in plan.layers.iter().zip(artifacts) {
            let dst = context.join(layer_context_dir(layer));
            copy_dir(Path::new(&artifact.artifact), &dst).await?;
        }

        let dockerfile = generate_dockerfile(plan);
        tokio::fs::write(context.join("Dockerfile"), &dockerfile)
            .await
            .map_err(|e| StratumError::io("writing Dockerfile", e))?;

        let tag = self.tag.clone().unwrap_or_else(|| plan.image_tag());
        let result = self.run_build(&context, &tag, on_output).await;

        // Clean up build context (best-effort)
        let _ = tokio::fs::remove_dir_all(&context).await;

        result?;
        Ok(tag)
    }
}

impl DockerfileBackend {
    async fn run_build(
        &self,
        context: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> StratumResult<()> {
        let mut child = Command::new(&self.build_command)
            .args(["build", "-t", tag, "."])
            .current_dir(context)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                StratumError::command_failed(format!("{} build", self.build_command), e)
            })?;

        let output = stream_child_output(&mut child, on_output).await;

        let status = child.wait().await.map_err(|e| {
            StratumError::command_failed(format!("{} build", self.build_command), e)
        })?;

        if !status.success() {
            return Err(StratumError::AssemblyFailed {
                backend: "dockerfile".to_string(),
                reason: build_error_output(&output),
            });
        }

        Ok(())
    }
}

/// Context subdirectory name for a layer
fn layer_context_dir(layer: &Layer) -> String {
    format!("layer-{:02}", layer.order_index)
}

/// Generate the Dockerfile for a plan.
///
/// One COPY per layer so the builder's cache invalidates exactly the
/// layers whose content changed. The options environment variable is
/// declared empty so the runtime can inject options without a rebuild.
fn generate_dockerfile(plan: &BuildPlan) -> String {
    let mut lines = Vec::new();

    lines.push(format!("FROM {}", plan.base_image));
    lines.push(String::new());

    for layer in &plan.layers {
        lines.push(format!(
            "# Layer {}: {} ({})",
            layer.order_index,
            layer.class,
            layer.short_digest()
        ));
        lines.push(format!(
            "COPY {}/ {}/",
            layer_context_dir(layer),
            IMAGE_APP_ROOT
        ));
        lines.push(String::new());
    }

    if let Some(ref options_env) = plan.entrypoint.options_env {
        lines.push(format!("ENV {}=\"\"", options_env));
    }

    let mut exec: Vec<String> = Vec::new();
    exec.push(format!("{}/{}", IMAGE_APP_ROOT, plan.entrypoint.executable));
    exec.extend(plan.entrypoint.fixed_prefix().iter().cloned());
    // Exec-form ENTRYPOINT; runtime-supplied arguments fill the
    // positional slots via CMD
    let exec_json = serde_json::to_string(&exec).unwrap_or_else(|_| "[]".to_string());
    lines.push(format!("ENTRYPOINT {}", exec_json));

    lines.join("\n")
}

/// Recursively copy a directory tree
async fn copy_dir(src: &Path, dst: &Path) -> StratumResult<()> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to)
            .await
            .map_err(|e| StratumError::io(format!("creating {}", to.display()), e))?;

        let mut read_dir = tokio::fs::read_dir(&from)
            .await
            .map_err(|e| StratumError::io(format!("reading {}", from.display()), e))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| StratumError::io("reading staged layer entry", e))?
        {
            let entry_from = entry.path();
            let entry_to = to.join(entry.file_name());
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StratumError::io("stat staged layer entry", e))?;

            if meta.is_dir() {
                pending.push((entry_from, entry_to));
            } else {
                tokio::fs::copy(&entry_from, &entry_to)
                    .await
                    .map_err(|e| StratumError::io(format!("copying {}", entry_from.display()), e))?;
            }
        }
    }

    Ok(())
}
