//! Input files: JSON-lines ticks and JSON relation seeds

use serde::{Deserialize, Serialize};
use std::path::Path;
use stepweave_core::{Result, Tick};
use stepweave_watcher::{Member, RegisterFlags};
use tracing::{info, warn};

/// One relation to register before the first cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationSeed {
    pub members: Vec<Member>,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default = "default_priority")]
    pub priority: f64,
    #[serde(default)]
    pub flags: RegisterFlags,
}

fn default_strength() -> f64 {
    0.5
}

fn default_priority() -> f64 {
    1.0
}

/// Read ticks from a JSON-lines file. Blank lines are ignored; malformed
/// lines are logged and skipped.
pub fn load_ticks(path: &Path) -> Result<Vec<Tick>> {
    let content = std::fs::read_to_string(path)?;
    let mut ticks = Vec::new();
    let mut skipped = 0usize;
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Tick>(line) {
            Ok(tick) => ticks.push(tick),
            Err(e) => {
                skipped += 1;
                warn!("{}:{}: skipping malformed tick: {}", path.display(), lineno + 1, e);
            }
        }
    }
    info!(
        "loaded {} tick(s) from {} ({} skipped)",
        ticks.len(),
        path.display(),
        skipped
    );
    Ok(ticks)
}

/// Read a JSON array of relation seeds.
pub fn load_relation_seeds(path: &Path) -> Result<Vec<RelationSeed>> {
    let content = std::fs::read_to_string(path)?;
    let seeds: Vec<RelationSeed> = serde_json::from_str(&content)?;
    info!("loaded {} relation seed(s) from {}", seeds.len(), path.display());
    Ok(seeds)
}
