//! Editor options, loadable from the host application's JSON config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ogc::DEFAULT_BASE_PATH;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorOptions {
    /// Backend route prefix for the WFS-T proxy.
    pub base_path: String,
    /// Window in which keystroke edits to the same cell are coalesced.
    pub debounce_ms: u64,
    pub graveyard_capacity: usize,
    /// Entries dropped at once when the graveyard is full.
    pub graveyard_evict_batch: usize,
    pub unique_cache_capacity: usize,
    pub unique_cache_evict_batch: usize,
    /// Upper bound passed as `maxFeatures` when loading a layer.
    pub max_features: Option<usize>,
    /// Property shown in the hover tooltip. Defaults to the first visible
    /// non-id column.
    pub tooltip_field: Option<String>,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            debounce_ms: 120,
            graveyard_capacity: 500,
            graveyard_evict_batch: 50,
            unique_cache_capacity: 64,
            unique_cache_evict_batch: 8,
            max_features: None,
            tooltip_field: None,
        }
    }
}

impl EditorOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        let opts: Self = serde_json::from_str(text)?;
        Ok(opts.normalized())
    }

    /// Clamp sizes to at least 1 and eviction batches to their capacity.
    pub fn normalized(mut self) -> Self {
        if self.base_path.is_empty() {
            self.base_path = DEFAULT_BASE_PATH.to_string();
        }
        self.graveyard_capacity = self.graveyard_capacity.max(1);
        self.graveyard_evict_batch = self
            .graveyard_evict_batch
            .clamp(1, self.graveyard_capacity);
        self.unique_cache_capacity = self.unique_cache_capacity.max(1);
        self.unique_cache_evict_batch = self
            .unique_cache_evict_batch
            .clamp(1, self.unique_cache_capacity);
        self.max_features = self.max_features.map(|n| n.max(1));
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
