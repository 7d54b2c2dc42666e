//! Pass cache tuning knobs.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Minimum time between two garbage collection sweeps.
    pub gc_interval_secs: u64,
    /// Vertex attribute slots available to generated attribute inputs.
    pub max_vertex_attributes: usize,
    /// Binding slot of the `NodeTree` uniform buffer.
    pub node_tree_ubo_slot: u32,
    /// Binding slot of the per-draw `UniformAttrs` uniform buffer array.
    pub uniform_attrs_ubo_slot: u32,
    /// Length of the `UniformAttrs` array (draw resources per chunk).
    pub resource_chunk_len: u32,
    /// Worker threads spawned by [`crate::pass::DeferredCompiler`].
    pub deferred_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            gc_interval_secs: 60,
            max_vertex_attributes: 16,
            node_tree_ubo_slot: 1,
            uniform_attrs_ubo_slot: 2,
            resource_chunk_len: 512,
            deferred_workers: 2,
        }
    }
}

impl CacheConfig {
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid pass cache config json")
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pass cache config {}", path.display()))?;
        Self::from_json_str(&text)
    }
}
