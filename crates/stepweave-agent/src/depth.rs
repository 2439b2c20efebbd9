//! Adaptive search depth with latency throttling
//!
//! Depth rises when scores or watcher context ratios are spread out and
//! falls when they are flat. A cycle over the latency budget drops depth at
//! once and holds it for `cooldown` cycles before normal control resumes.

use serde::{Deserialize, Serialize};
use stepweave_core::AgentConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthChange {
    Raised,
    Lowered,
    Held,
    Throttled,
    Restored,
}

#[derive(Clone, Debug)]
pub struct DepthController {
    depth: usize,
    min: usize,
    ceiling: usize,
    high: f64,
    low: f64,
    budget_ms: f64,
    cooldown_len: u32,
    cooldown: u32,
}

impl DepthController {
    pub fn new(config: &AgentConfig) -> Self {
        let ceiling = config.depth_ceiling.min(AgentConfig::DEPTH_LIMIT).max(1);
        let min = config.min_depth.clamp(1, ceiling);
        Self {
            depth: config.max_depth.clamp(min, ceiling),
            min,
            ceiling,
            high: config.dispersion_high,
            low: config.dispersion_low,
            budget_ms: config.latency_budget_ms,
            cooldown_len: config.throttle_cooldown,
            cooldown: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Force a depth, clamped to the configured bounds.
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth.clamp(self.min, self.ceiling);
    }

    pub fn throttled(&self) -> bool {
        self.cooldown > 0
    }

    pub fn observe(
        &mut self,
        dispersion: f64,
        context_variance: f64,
        latency_ms: f64,
    ) -> DepthChange {
        if latency_ms > self.budget_ms {
            self.depth = self.depth.saturating_sub(1).max(self.min);
            self.cooldown = self.cooldown_len.max(1);
            return DepthChange::Throttled;
        }
        if self.cooldown > 0 {
            self.cooldown -= 1;
            return if self.cooldown == 0 {
                DepthChange::Restored
            } else {
                DepthChange::Held
            };
        }

        let spread = dispersion.max(context_variance);
        if spread > self.high && self.depth < self.ceiling {
            self.depth += 1;
            DepthChange::Raised
        } else if spread < self.low && self.depth > self.min {
            self.depth -= 1;
            DepthChange::Lowered
        } else {
            DepthChange::Held
        }
    }
}
