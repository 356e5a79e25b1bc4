//! Assembly backend abstraction
//!
//! A backend materializes layers and finalizes images. Concrete
//! implementations wrap whatever image-assembly mechanism is at hand;
//! the planner only depends on this trait.

use crate::error::StratumResult;
use crate::plan::{BuildPlan, Layer};
use async_trait::async_trait;
use std::path::Path;

/// A materialized (or cache-reused) layer artifact
#[derive(Debug, Clone)]
pub struct LayerArtifact {
    /// Layer content digest
    pub digest: String,

    /// Backend-specific artifact reference
    pub artifact: String,

    /// Whether the artifact came from the cache
    pub reused: bool,
}

/// Abstract image assembly backend.
///
/// Layers are always processed in ascending order_index: later layers
/// may depend on earlier ones existing in the assembled filesystem.
/// Backends never retry; retry policy belongs to the caller.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Backend name for display and errors
    fn name(&self) -> &'static str;

    /// Check if the backend's tooling is available on this system
    async fn is_available(&self) -> StratumResult<bool>;

    /// Materialize one layer from the build tree, returning an artifact
    /// reference.
    ///
    /// Must be idempotent per digest: re-materializing an
    /// already-produced layer returns the existing artifact.
    async fn materialize_layer(&self, tree_root: &Path, layer: &Layer) -> StratumResult<String>;

    /// Assemble the final image from the plan and its layer artifacts.
    ///
    /// `on_output` receives build tool output lines for progress display.
    /// Returns the final image reference.
    async fn assemble_image(
        &self,
        plan: &BuildPlan,
        artifacts: &[LayerArtifact],
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> StratumResult<String>;
}
