//! Serializable watcher state
//!
//! Written atomically: JSON goes to `<path>.tmp` first and is renamed into
//! place, so a crash never leaves a half-written snapshot.

use crate::ghost::Ghost;
use crate::relation::Relation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use stepweave_core::Result;
use tracing::info;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatcherSnapshot {
    pub version: u32,
    pub relations: Vec<Relation>,
    pub ghosts: BTreeMap<String, Ghost>,
    /// Arities in the context window, oldest first.
    pub window: Vec<usize>,
    pub window_size: usize,
    pub decay_rate: f64,
    #[serde(default)]
    pub cycle: u64,
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub event_ema: f64,
}

impl WatcherSnapshot {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        info!("watcher snapshot written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
