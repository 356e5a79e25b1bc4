//! Layer planning
//!
//! Turns a classified file tree into an ordered, content-addressed
//! build plan: partitioning into layers, deriving per-layer cache keys,
//! and emitting the plan an assembly backend consumes.

pub mod digest;
pub mod emit;
pub mod partition;

pub use emit::{emit_plan, BuildPlan, EntrypointSpec};
pub use partition::{partition_layers, Layer, LayerPolicy};
