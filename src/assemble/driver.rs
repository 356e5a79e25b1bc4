//! Assembly driver
//!
//! Owns the single-plan state machine and the cache reuse decisions.
//! Layers are processed strictly in ascending order_index; cancellation
//! is honored only at layer boundaries; there is no partial commit. A
//! failed plan produces no image reference, though already-materialized
//! artifacts stay cached for a retry (they are addressed by content
//! digest, not by plan identity).

use crate::assemble::backend::{ImageBackend, LayerArtifact};
use crate::cache::{CacheRecord, CacheStore};
use crate::error::{StratumError, StratumResult};
use crate::plan::BuildPlan;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Execution state of a single plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    /// Plan emitted, assembly not started
    Planned,
    /// Layers being materialized
    Assembling,
    /// Image reference produced
    Assembled,
    /// Assembly aborted; no image reference
    Failed,
}

impl PlanState {
    /// Whether a transition to `next` is legal
    pub fn can_transition_to(self, next: PlanState) -> bool {
        matches!(
            (self, next),
            (PlanState::Planned, PlanState::Assembling)
                | (PlanState::Assembling, PlanState::Assembled)
                | (PlanState::Assembling, PlanState::Failed)
        )
    }
}

/// Options controlling a single assembly run
#[derive(Clone)]
pub struct AssemblyOptions {
    /// Reuse cached artifacts for digest hits
    pub use_cache: bool,

    /// Cooperative cancellation flag, checked between layers
    pub cancel: Arc<AtomicBool>,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Outcome of a successful assembly
#[derive(Debug)]
pub struct AssemblyReport {
    /// Final image reference
    pub image: String,

    /// Per-layer artifacts in plan order
    pub artifacts: Vec<LayerArtifact>,
}

impl AssemblyReport {
    /// Number of layers reused from the cache
    pub fn reused(&self) -> usize {
        self.artifacts.iter().filter(|a| a.reused).count()
    }

    /// Number of layers materialized this run
    pub fn materialized(&self) -> usize {
        self.artifacts.len() - self.reused()
    }
}

struct AssemblyRun {
    state: PlanState,
}

impl AssemblyRun {
    fn new() -> Self {
        Self {
            state: PlanState::Planned,
        }
    }

    fn transition(&mut self, next: PlanState) {
        debug_assert!(self.state.can_transition_to(next));
        debug!("Plan state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Drive a plan through the backend.
///
/// Cache hits reuse the recorded artifact; misses call the backend.
/// New records are appended to the store only after the whole plan
/// assembles; a failed run leaves the store untouched.
pub async fn run_assembly(
    backend: &dyn ImageBackend,
    plan: &BuildPlan,
    store: &mut CacheStore,
    tree_root: &Path,
    opts: &AssemblyOptions,
    on_layer: &(dyn Fn(&crate::plan::Layer, bool) + Send + Sync),
    on_output: &(dyn Fn(String) + Send + Sync),
) -> StratumResult<AssemblyReport> {
    let mut run = AssemblyRun::new();
    run.transition(PlanState::Assembling);

    let mut artifacts: Vec<LayerArtifact> = Vec::with_capacity(plan.layers.len());

    for layer in &plan.layers {
        if opts.cancel.load(Ordering::SeqCst) {
            run.transition(PlanState::Failed);
            return Err(StratumError::AssemblyCancelled {
                order_index: layer.order_index,
            });
        }

        let cached = if opts.use_cache {
            store.get(&layer.content_digest).map(|r| r.artifact.clone())
        } else {
            None
        };

        let (artifact, reused) = match cached {
            Some(artifact) => (artifact, true),
            None => match materialize(backend, tree_root, layer).await {
                Ok(artifact) => (artifact, false),
                Err(e) => {
                    run.transition(PlanState::Failed);
                    return Err(e);
                }
            },
        };

        on_layer(layer, reused);
        artifacts.push(LayerArtifact {
            digest: layer.content_digest.clone(),
            artifact,
            reused,
        });
    }

    let image = match backend.assemble_image(plan, &artifacts, on_output).await {
        Ok(image) => image,
        Err(e) => {
            run.transition(PlanState::Failed);
            return Err(wrap_backend_error(backend.name(), e));
        }
    };

    run.transition(PlanState::Assembled);

    for artifact in artifacts.iter().filter(|a| !a.reused) {
        store
            .append(CacheRecord::new(
                artifact.digest.clone(),
                artifact.artifact.clone(),
            ))
            .await?;
    }

    info!(
        "Assembled {} ({} reused, {} materialized)",
        image,
        artifacts.iter().filter(|a| a.reused).count(),
        artifacts.iter().filter(|a| !a.reused).count(),
    );

    Ok(AssemblyReport { image, artifacts })
}

async fn materialize(
    backend: &dyn ImageBackend,
    tree_root: &Path,
    layer: &crate::plan::Layer,
) -> StratumResult<String> {
    backend
        .materialize_layer(tree_root, layer)
        .await
        .map_err(|e| wrap_backend_error(backend.name(), e))
}

/// Wrap a backend failure so callers see which backend failed.
/// Errors that are already assembly errors pass through.
fn wrap_backend_error(backend: &str, err: StratumError) -> StratumError {
    match err {
        e @ (StratumError::AssemblyFailed { .. } | StratumError::AssemblyCancelled { .. }) => e,
        other => StratumError::AssemblyFailed {
            backend: backend.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{FileEntry, VolatilityClass};
    use crate::plan::{emit_plan, partition_layers, EntrypointSpec, LayerPolicy};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeBackend {
        fail_finalize: bool,
        fail_layer: Option<usize>,
        materialized: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                fail_finalize: false,
                fail_layer: None,
                materialized: Mutex::new(Vec::new()),
            }
        }

        fn materialized_count(&self) -> usize {
            self.materialized.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ImageBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn is_available(&self) -> StratumResult<bool> {
            Ok(true)
        }

        async fn materialize_layer(
            &self,
            _tree_root: &Path,
            layer: &crate::plan::Layer,
        ) -> StratumResult<String> {
            if self.fail_layer == Some(layer.order_index) {
                return Err(StratumError::Internal("boom".to_string()));
            }
            self.materialized
                .lock()
                .unwrap()
                .push(layer.content_digest.clone());
            Ok(format!("/fake/{}", layer.content_digest))
        }

        async fn assemble_image(
            &self,
            plan: &BuildPlan,
            _artifacts: &[LayerArtifact],
            _on_output: &(dyn Fn(String) + Send + Sync),
        ) -> StratumResult<String> {
            if self.fail_finalize {
                return Err(StratumError::Internal("finalize boom".to_string()));
            }
            Ok(plan.image_tag())
        }
    }

    fn test_plan() -> BuildPlan {
        let entries = vec![
            FileEntry {
                path: "lib/dep.jar".to_string(),
                size: 10,
                content_hash: "aa".to_string(),
                class: VolatilityClass::FixedDependency,
            },
            FileEntry {
                path: "classes/bin/run".to_string(),
                size: 5,
                content_hash: "bb".to_string(),
                class: VolatilityClass::ApplicationCode,
            },
        ];
        let layers = partition_layers(entries, &LayerPolicy::default()).unwrap();
        emit_plan(
            layers,
            "base:latest",
            EntrypointSpec {
                executable: "classes/bin/run".to_string(),
                args: vec![],
                options_env: None,
            },
        )
        .unwrap()
    }

    async fn empty_store(temp: &TempDir) -> CacheStore {
        CacheStore::open(temp.path().join("records.jsonl"))
            .await
            .unwrap()
    }

    #[test]
    fn state_machine_transitions() {
        assert!(PlanState::Planned.can_transition_to(PlanState::Assembling));
        assert!(PlanState::Assembling.can_transition_to(PlanState::Assembled));
        assert!(PlanState::Assembling.can_transition_to(PlanState::Failed));

        assert!(!PlanState::Planned.can_transition_to(PlanState::Assembled));
        assert!(!PlanState::Assembled.can_transition_to(PlanState::Assembling));
        assert!(!PlanState::Failed.can_transition_to(PlanState::Assembling));
    }

    #[tokio::test]
    async fn cold_cache_materializes_everything() {
        let temp = TempDir::new().unwrap();
        let mut store = empty_store(&temp).await;
        let backend = FakeBackend::new();
        let plan = test_plan();

        let report = run_assembly(
            &backend,
            &plan,
            &mut store,
            temp.path(),
            &AssemblyOptions::default(),
            &|_, _| {},
            &|_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.materialized(), 2);
        assert_eq!(report.reused(), 0);
        assert_eq!(store.len(), 2);
        assert!(report.image.starts_with("stratum-"));
    }

    #[tokio::test]
    async fn warm_cache_materializes_nothing() {
        let temp = TempDir::new().unwrap();
        let mut store = empty_store(&temp).await;
        let backend = FakeBackend::new();
        let plan = test_plan();

        run_assembly(
            &backend,
            &plan,
            &mut store,
            temp.path(),
            &AssemblyOptions::default(),
            &|_, _| {},
            &|_| {},
        )
        .await
        .unwrap();

        // Replanning an unchanged tree: every digest hits the cache
        let report = run_assembly(
            &backend,
            &plan,
            &mut store,
            temp.path(),
            &AssemblyOptions::default(),
            &|_, _| {},
            &|_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.reused(), 2);
        assert_eq!(report.materialized(), 0);
        assert_eq!(backend.materialized_count(), 2); // only the first run
    }

    #[tokio::test]
    async fn no_cache_ignores_records() {
        let temp = TempDir::new().unwrap();
        let mut store = empty_store(&temp).await;
        let backend = FakeBackend::new();
        let plan = test_plan();

        let opts = AssemblyOptions {
            use_cache: false,
            ..AssemblyOptions::default()
        };

        run_assembly(&backend, &plan, &mut store, temp.path(), &opts, &|_, _| {}, &|_| {})
            .await
            .unwrap();
        run_assembly(&backend, &plan, &mut store, temp.path(), &opts, &|_, _| {}, &|_| {})
            .await
            .unwrap();

        assert_eq!(backend.materialized_count(), 4);
    }

    #[tokio::test]
    async fn layer_failure_leaves_store_untouched() {
        let temp = TempDir::new().unwrap();
        let mut store = empty_store(&temp).await;
        let backend = FakeBackend {
            fail_layer: Some(1),
            ..FakeBackend::new()
        };
        let plan = test_plan();

        let result = run_assembly(
            &backend,
            &plan,
            &mut store,
            temp.path(),
            &AssemblyOptions::default(),
            &|_, _| {},
            &|_| {},
        )
        .await;

        assert!(matches!(result, Err(StratumError::AssemblyFailed { .. })));
        // No partial commit: nothing recorded
        assert_eq!(store.len(), 0);
        // Layer 0 did materialize and stays reusable on retry
        assert_eq!(backend.materialized_count(), 1);
    }

    #[tokio::test]
    async fn finalize_failure_produces_no_image() {
        let temp = TempDir::new().unwrap();
        let mut store = empty_store(&temp).await;
        let backend = FakeBackend {
            fail_finalize: true,
            ..FakeBackend::new()
        };
        let plan = test_plan();

        let result = run_assembly(
            &backend,
            &plan,
            &mut store,
            temp.path(),
            &AssemblyOptions::default(),
            &|_, _| {},
            &|_| {},
        )
        .await;

        assert!(matches!(result, Err(StratumError::AssemblyFailed { .. })));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn cancellation_stops_before_first_layer() {
        let temp = TempDir::new().unwrap();
        let mut store = empty_store(&temp).await;
        let backend = FakeBackend::new();
        let plan = test_plan();

        let opts = AssemblyOptions::default();
        opts.cancel.store(true, Ordering::SeqCst);

        let result = run_assembly(
            &backend,
            &plan,
            &mut store,
            temp.path(),
            &opts,
            &|_, _| {},
            &|_| {},
        )
        .await;

        assert!(matches!(
            result,
            Err(StratumError::AssemblyCancelled { order_index: 0 })
        ));
        assert_eq!(backend.materialized_count(), 0);
    }

    #[tokio::test]
    async fn layers_processed_in_order() {
        let temp = TempDir::new().unwrap();
        let mut store = empty_store(&temp).await;
        let backend = FakeBackend::new();
        let plan = test_plan();

        let seen = Mutex::new(Vec::new());
        run_assembly(
            &backend,
            &plan,
            &mut store,
            temp.path(),
            &AssemblyOptions::default(),
            &|layer, _| seen.lock().unwrap().push(layer.order_index),
            &|_| {},
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
