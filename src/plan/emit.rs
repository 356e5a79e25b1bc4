//! Build plan emission
//!
//! Combines ordered layers, a base image reference, and an entrypoint
//! specification into an immutable [`BuildPlan`]. The serialized plan is
//! the bit-exact artifact an assembly backend consumes.

use crate::classify::VolatilityClass;
use crate::error::{StratumError, StratumResult};
use crate::plan::digest;
use crate::plan::partition::Layer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Placeholder in the argument template for a runtime-supplied argument
pub const ARG_SLOT: &str = "{}";

/// Entrypoint specification for the assembled image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrypointSpec {
    /// Tree-relative path of the executable; must live in an
    /// application-code layer
    pub executable: String,

    /// Argument template; `{}` marks a positional slot filled with
    /// runtime-supplied arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variable consulted for extra options at run time
    #[serde(default)]
    pub options_env: Option<String>,
}

impl EntrypointSpec {
    /// Arguments up to the first positional slot.
    ///
    /// These are baked into the image; runtime arguments fill the slots
    /// and anything after them.
    pub fn fixed_prefix(&self) -> &[String] {
        let end = self
            .args
            .iter()
            .position(|a| a == ARG_SLOT)
            .unwrap_or(self.args.len());
        &self.args[..end]
    }

    /// Substitute runtime arguments into the template.
    ///
    /// Each `{}` consumes the next runtime argument (empty string when
    /// exhausted); leftover runtime arguments are appended.
    pub fn render_args(&self, runtime_args: &[String]) -> Vec<String> {
        let mut rendered = Vec::with_capacity(self.args.len() + runtime_args.len());
        let mut next = 0usize;

        for arg in &self.args {
            if arg == ARG_SLOT {
                if let Some(value) = runtime_args.get(next) {
                    rendered.push(value.clone());
                }
                next += 1;
            } else {
                rendered.push(arg.clone());
            }
        }
        for value in runtime_args.iter().skip(next.min(runtime_args.len())) {
            rendered.push(value.clone());
        }

        rendered
    }
}

/// The complete, ordered description handed to an assembly backend.
///
/// Constructed once per build invocation and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPlan {
    /// Base image reference the layers are applied onto
    pub base_image: String,

    /// Entrypoint metadata for the final image
    pub entrypoint: EntrypointSpec,

    /// Layers in ascending order_index
    pub layers: Vec<Layer>,
}

impl BuildPlan {
    /// Content-addressed tag for the assembled image.
    ///
    /// Derived from the base image and every layer digest, so the same
    /// plan always assembles to the same tag.
    pub fn image_tag(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.base_image.as_bytes());
        hasher.update([0u8]);
        for layer in &self.layers {
            hasher.update(layer.content_digest.as_bytes());
            hasher.update([0u8]);
        }
        let hash = hex::encode(hasher.finalize());
        format!("stratum-{}", digest::short_digest(&hash))
    }

    /// Serialize the plan as pretty JSON
    pub fn to_json(&self) -> StratumResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a plan from JSON
    pub fn from_json(content: &str) -> StratumResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Total size of all layer entries in bytes
    pub fn total_bytes(&self) -> u64 {
        self.layers.iter().map(|l| l.total_bytes()).sum()
    }
}

/// Emit a validated build plan.
///
/// Validation failures surface before any backend call: the base
/// reference must be non-empty and the entrypoint executable must be
/// present in an application-code layer.
pub fn emit_plan(
    layers: Vec<Layer>,
    base_image: &str,
    entrypoint: EntrypointSpec,
) -> StratumResult<BuildPlan> {
    if base_image.trim().is_empty() {
        return Err(StratumError::invalid_plan("base image reference is empty"));
    }
    if entrypoint.executable.trim().is_empty() {
        return Err(StratumError::invalid_plan("entrypoint executable is empty"));
    }

    let in_app_layer = layers
        .iter()
        .filter(|l| l.class == VolatilityClass::ApplicationCode)
        .flat_map(|l| l.entries.iter())
        .any(|e| e.path == entrypoint.executable);

    if !in_app_layer {
        return Err(StratumError::invalid_plan(format!(
            "entrypoint executable '{}' is not in any application-code layer",
            entrypoint.executable
        )));
    }

    Ok(BuildPlan {
        base_image: base_image.to_string(),
        entrypoint,
        layers,
    })
}
