//! Agent checkpoints

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use stepweave_core::{Result, StateVector};
use tracing::info;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentCheckpoint {
    pub version: u32,
    pub cycle_count: u64,
    pub synergy_memory: BTreeMap<String, f64>,
    pub kernel_state: StateVector,
    #[serde(default)]
    pub depth: Option<usize>,
}

impl AgentCheckpoint {
    /// Atomic write: `<path>.tmp` then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        info!("checkpoint at cycle {} written to {}", self.cycle_count, path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
