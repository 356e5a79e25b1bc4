//! Layer partitioning
//!
//! Groups classified entries into ordered layers honoring the policy's
//! volatility order and size constraints. Layer order is a total order
//! consistent with volatility: no later layer is rebuilt when only an
//! earlier class changes.

use crate::classify::{FileEntry, VolatilityClass};
use crate::error::{StratumError, StratumResult};
use crate::plan::digest;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Layering policy
#[derive(Debug, Clone)]
pub struct LayerPolicy {
    /// Maximum number of layers in the emitted plan
    pub max_layers: usize,

    /// Maximum bytes per layer; `None` means unlimited
    pub max_layer_bytes: Option<u64>,

    /// Volatility classes in layer order (most stable first)
    pub volatility_order: Vec<VolatilityClass>,
}

impl Default for LayerPolicy {
    fn default() -> Self {
        Self {
            max_layers: 4,
            max_layer_bytes: None,
            volatility_order: VolatilityClass::all().to_vec(),
        }
    }
}

/// An ordered, independently cacheable group of files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    /// Position in the plan; lower is applied earlier and cached longer
    pub order_index: usize,

    /// Volatility class shared by every entry in the layer
    pub class: VolatilityClass,

    /// Entries in canonical (path-sorted) order
    pub entries: Vec<FileEntry>,

    /// Content digest over (path, content hash) pairs
    pub content_digest: String,
}

impl Layer {
    /// Total size of the layer's entries in bytes
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Display-shortened digest
    pub fn short_digest(&self) -> &str {
        digest::short_digest(&self.content_digest)
    }
}

/// Partition classified entries into ordered layers.
///
/// Entries are grouped by volatility class in policy order; empty classes
/// are omitted. A class whose byte total exceeds `max_layer_bytes` is
/// subdivided by path-sorted greedy chunking. Every entry lands in exactly
/// one layer.
pub fn partition_layers(
    entries: Vec<FileEntry>,
    policy: &LayerPolicy,
) -> StratumResult<Vec<Layer>> {
    validate_policy(policy)?;

    for entry in &entries {
        if !policy.volatility_order.contains(&entry.class) {
            return Err(StratumError::policy(format!(
                "class '{}' ({}) is missing from the volatility order",
                entry.class, entry.path
            )));
        }
    }

    // Group by class in policy order
    let mut groups: Vec<(VolatilityClass, Vec<FileEntry>)> = Vec::new();
    for class in &policy.volatility_order {
        let mut group: Vec<FileEntry> =
            entries.iter().filter(|e| e.class == *class).cloned().collect();
        if group.is_empty() {
            continue;
        }
        group.sort_by(|a, b| a.path.cmp(&b.path));
        groups.push((*class, group));
    }

    if groups.len() > policy.max_layers {
        return Err(StratumError::policy(format!(
            "{} non-empty volatility classes cannot fit into max_layers = {}",
            groups.len(),
            policy.max_layers
        )));
    }

    // Subdivide oversized classes, preserving class order
    let mut layers = Vec::new();
    for (class, group) in groups {
        for chunk in chunk_by_bytes(group, policy.max_layer_bytes) {
            let content_digest = digest::layer_digest(&chunk);
            layers.push(Layer {
                order_index: layers.len(),
                class,
                entries: chunk,
                content_digest,
            });
        }
    }

    if layers.len() > policy.max_layers {
        return Err(StratumError::policy(format!(
            "size chunking needs {} layers but max_layers = {}",
            layers.len(),
            policy.max_layers
        )));
    }

    debug!(
        "Partitioned {} entries into {} layers",
        layers.iter().map(|l| l.entries.len()).sum::<usize>(),
        layers.len()
    );

    Ok(layers)
}

fn validate_policy(policy: &LayerPolicy) -> StratumResult<()> {
    if policy.max_layers == 0 {
        return Err(StratumError::policy("max_layers must be at least 1"));
    }
    if policy.volatility_order.is_empty() {
        return Err(StratumError::policy("volatility order is empty"));
    }
    for (i, class) in policy.volatility_order.iter().enumerate() {
        if policy.volatility_order[..i].contains(class) {
            return Err(StratumError::policy(format!(
                "volatility order lists '{}' twice",
                class
            )));
        }
    }
    Ok(())
}

/// Greedy path-sorted chunking.
///
/// A chunk closes when adding the next entry would exceed the threshold;
/// a single entry larger than the threshold gets a chunk of its own.
fn chunk_by_bytes(entries: Vec<FileEntry>, max_bytes: Option<u64>) -> Vec<Vec<FileEntry>> {
    let Some(max) = max_bytes else {
        return vec![entries];
    };

    let mut chunks = Vec::new();
    let mut current: Vec<FileEntry> = Vec::new();
    let mut current_bytes = 0u64;

    for entry in entries {
        if !current.is_empty() && current_bytes + entry.size > max {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += entry.size;
        current.push(entry);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
