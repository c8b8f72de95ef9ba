//! Engine configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default for [`EngineConfig::max_group_depth`]
pub const DEFAULT_MAX_GROUP_DEPTH: usize = 16;
/// Default for [`EngineConfig::tick_interval_ms`]
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
/// Default for [`EngineConfig::undo_depth`]
pub const DEFAULT_UNDO_DEPTH: usize = 100;

/// Tunables for passes, groups, ticks and undo history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Leave pure nodes with no linked output dirty instead of computing them
    pub skip_unlinked_pure: bool,
    /// Deepest allowed group nesting
    pub max_group_depth: usize,
    /// Interval of the periodic tick driver
    pub tick_interval_ms: u64,
    /// Snapshots kept by undo stacks created from this config
    pub undo_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            skip_unlinked_pure: true,
            max_group_depth: DEFAULT_MAX_GROUP_DEPTH,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            undo_depth: DEFAULT_UNDO_DEPTH,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&content)?;
        log::debug!("Loaded engine config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
