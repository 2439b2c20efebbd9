//! Engine configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepweaveConfig {
    /// State kernel: feasibility, stabilization, adaptive controller.
    pub kernel: KernelConfig,
    /// Tick journal: ring buffer, payload caps, authentication.
    pub journal: JournalConfig,
    /// Relation watcher: decay, ghosts, context window.
    pub watcher: WatcherConfig,
    /// Path-search agent: enumeration, scoring, depth control.
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Adds the contradiction check to the feasibility predicate.
    pub strict: bool,
    /// Minimum distance for two states to count as different.
    pub difference_epsilon: f64,
    /// Replace tiny nonzero states with a unit basis vector.
    pub stabilize: bool,
    /// Absolute floor of the stabilization threshold.
    pub stabilize_floor: f64,
    /// Fraction of `dynamic_threshold` used as the stabilization threshold.
    pub stabilize_scale: f64,
    /// Maximum retained history length (oldest states dropped).
    pub history_capacity: usize,
    /// Initial smoothing factor, must be in [0,1].
    pub rho: f64,
    /// Initial secondary smoothing factor, must be in [0,1].
    pub lambda: f64,
    /// Rolling signal window bounds.
    pub window_min: usize,
    pub window_max: usize,
    pub latency_weight: f64,
    pub entropy_weight: f64,
    /// Multiplier applied to `latency_weight` when latency exceeds 1.2× budget.
    pub latency_gain: f64,
    /// Multiplier applied to `latency_weight` otherwise.
    pub latency_decay: f64,
    /// Fault count above which `entropy_weight` is halved.
    pub fault_ceiling: u32,
    /// Initial latency budget in milliseconds.
    pub latency_budget_ms: f64,
    /// Floor for the latency budget in milliseconds.
    pub min_latency_budget_ms: f64,
    /// Load normalisation constant for the latency penalty.
    pub max_load: f64,
    /// Weight of the external memory term in the bias score.
    pub memory_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Ring buffer capacity; oldest entries are evicted on overflow.
    pub capacity: usize,
    /// Payload size cap in bytes.
    pub max_payload_bytes: usize,
    /// Shared secret for HMAC tick authentication. None disables auth.
    pub auth_secret: Option<String>,
    /// Skips authentication to save latency.
    pub low_latency: bool,
    /// Related tags fetched from the memory provider per tick.
    pub enrich_top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Relations below this strength are pruned.
    pub prune_floor: f64,
    /// Upper clamp for relation priority weights.
    pub max_priority: f64,
    /// Relation table capacity; weakest evicted on overflow.
    pub max_relations: usize,
    /// Decay rate bounds; both strictly below 1.0.
    pub min_decay_rate: f64,
    pub max_decay_rate: f64,
    /// Smoothing factor for the event-count moving average.
    pub event_ema_alpha: f64,
    /// Spawn a companion ghost for each minimal relation.
    pub companion_ghosts: bool,
    /// Initial ghost strength.
    pub ghost_seed_strength: f64,
    /// Multiplicative ghost growth when seen (result capped at 1.0).
    pub ghost_growth: f64,
    /// Ghosts at or above this strength ascend into relations.
    pub ascension_threshold: f64,
    /// Cosine similarity needed for a ghost to count as seen.
    pub seen_cutoff: f64,
    /// Cycles without being seen before a ghost or relation drifts.
    pub drift_gap: u64,
    /// Multiplicative decay for unseen ghosts.
    pub ghost_decay: f64,
    /// Ghosts below this are evicted.
    pub ghost_floor: f64,
    /// Spawn an offspring ghost on ascension.
    pub spawn_offspring: bool,
    /// Context window bounds and initial size.
    pub window_size: usize,
    pub window_min: usize,
    pub window_max: usize,
    /// Window growth/shrink multiplier.
    pub window_multiplier: f64,
    /// Auto-tune the window every N observe cycles.
    pub tune_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Starting combination depth.
    pub max_depth: usize,
    /// Depth bounds (hard limits 1..=5).
    pub min_depth: usize,
    pub depth_ceiling: usize,
    /// Relations considered for combination (top-k by weight).
    pub beam_width: usize,
    /// Cap on enumerated candidate paths per cycle.
    pub max_paths: usize,
    pub curvature_bias: f64,
    /// Magnitude of the uniform environment perturbation.
    pub noise: f64,
    /// Magnitude of the fallback perturbation when no relations exist.
    pub fallback_magnitude: f64,
    /// Use tanh on synergy memory; otherwise raw × `synergy_scale`.
    pub normalize_synergy: bool,
    pub synergy_scale: f64,
    /// Synergy memory capacity; weakest signature evicted on overflow.
    pub synergy_capacity: usize,
    /// Apply exp(-Σ age) to scores.
    pub time_decay: bool,
    /// Age (cycles) scaling inside the time-decay term.
    pub age_scale: f64,
    /// Repeat count at which co-occurring relations are consolidated.
    pub consolidate_after: u32,
    /// Repeat count at which ghost registration is requested instead.
    pub ghost_after: u32,
    /// Score dispersion / context variance thresholds for depth control.
    pub dispersion_high: f64,
    pub dispersion_low: f64,
    /// Cycle latency budget in milliseconds.
    pub latency_budget_ms: f64,
    /// Cycles to hold the throttled state before restoring.
    pub throttle_cooldown: u32,
    /// Score candidates on worker threads when there are at least this many.
    pub parallel_threshold: usize,
    /// Weight of the optional harmonic scoring term; 0 disables it.
    pub harmonic_weight: f64,
    /// Deterministic RNG seed; None seeds from entropy.
    pub seed: Option<u64>,
}

// ============================================================
// Defaults
// ============================================================

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            strict: false,
            difference_epsilon: 1e-3,
            stabilize: true,
            stabilize_floor: 1e-6,
            stabilize_scale: 1e-3,
            history_capacity: 1_024,
            rho: 0.5,
            lambda: 0.5,
            window_min: 8,
            window_max: 128,
            latency_weight: 1.0,
            entropy_weight: 1.0,
            latency_gain: 1.1,
            latency_decay: 0.95,
            fault_ceiling: 5,
            latency_budget_ms: 50.0,
            min_latency_budget_ms: 1.0,
            max_load: 1.0,
            memory_weight: 0.05,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_payload_bytes: 1_024,
            auth_secret: None,
            low_latency: false,
            enrich_top_k: 3,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            prune_floor: 1e-4,
            max_priority: 5.0,
            max_relations: 512,
            min_decay_rate: 0.85,
            max_decay_rate: 0.99,
            event_ema_alpha: 0.3,
            companion_ghosts: true,
            ghost_seed_strength: 0.3,
            ghost_growth: 1.25,
            ascension_threshold: 0.999,
            seen_cutoff: 0.35,
            drift_gap: 16,
            ghost_decay: 0.9,
            ghost_floor: 1e-5,
            spawn_offspring: true,
            window_size: 32,
            window_min: 8,
            window_max: 256,
            window_multiplier: 1.5,
            tune_every: 10,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            min_depth: 1,
            depth_ceiling: 4,
            beam_width: 12,
            max_paths: 256,
            curvature_bias: 0.1,
            noise: 0.01,
            fallback_magnitude: 0.05,
            normalize_synergy: true,
            synergy_scale: 0.01,
            synergy_capacity: 4_096,
            time_decay: true,
            age_scale: 0.01,
            consolidate_after: 3,
            ghost_after: 6,
            dispersion_high: 0.25,
            dispersion_low: 0.05,
            latency_budget_ms: 50.0,
            throttle_cooldown: 5,
            parallel_threshold: 128,
            harmonic_weight: 0.0,
            seed: None,
        }
    }
}

// ============================================================
// Loading & validation
// ============================================================

impl StepweaveConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        self.kernel.validate()?;
        self.journal.validate()?;
        self.watcher.validate()?;
        self.agent.validate()
    }
}

fn unit_interval(name: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::param_out_of_range(name, value, 0.0, 1.0));
    }
    Ok(())
}

impl KernelConfig {
    pub fn validate(&self) -> Result<()> {
        unit_interval("rho", self.rho)?;
        unit_interval("lambda", self.lambda)?;
        if self.window_min == 0 || self.window_min > self.window_max {
            return Err(Error::config(format!(
                "kernel window bounds invalid: {}..={}",
                self.window_min, self.window_max
            )));
        }
        if self.history_capacity < 2 {
            return Err(Error::config("kernel history_capacity must be at least 2"));
        }
        if self.max_load <= 0.0 || self.min_latency_budget_ms <= 0.0 {
            return Err(Error::config("kernel max_load and min_latency_budget_ms must be positive"));
        }
        Ok(())
    }
}

impl JournalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.max_payload_bytes == 0 {
            return Err(Error::config("journal capacity and max_payload_bytes must be nonzero"));
        }
        Ok(())
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        unit_interval("ghost_seed_strength", self.ghost_seed_strength)?;
        unit_interval("seen_cutoff", self.seen_cutoff)?;
        if !(self.min_decay_rate > 0.0
            && self.min_decay_rate <= self.max_decay_rate
            && self.max_decay_rate < 1.0)
        {
            return Err(Error::config(format!(
                "watcher decay bounds invalid: {}..={}",
                self.min_decay_rate, self.max_decay_rate
            )));
        }
        if self.window_min == 0 || self.window_min > self.window_max {
            return Err(Error::config("watcher window bounds invalid"));
        }
        if self.max_relations == 0 {
            return Err(Error::config("watcher max_relations must be nonzero"));
        }
        Ok(())
    }
}

impl AgentConfig {
    /// Absolute depth limit for combination enumeration.
    pub const DEPTH_LIMIT: usize = 5;

    pub fn validate(&self) -> Result<()> {
        if self.min_depth == 0
            || self.min_depth > self.depth_ceiling
            || self.depth_ceiling > Self::DEPTH_LIMIT
        {
            return Err(Error::config(format!(
                "agent depth bounds invalid: {}..={} (limit {})",
                self.min_depth,
                self.depth_ceiling,
                Self::DEPTH_LIMIT
            )));
        }
        if !(self.min_depth..=self.depth_ceiling).contains(&self.max_depth) {
            return Err(Error::config("agent max_depth outside depth bounds"));
        }
        if self.max_paths == 0 || self.beam_width == 0 {
            return Err(Error::config("agent max_paths and beam_width must be nonzero"));
        }
        if !(self.harmonic_weight.is_finite() && self.harmonic_weight >= 0.0) {
            return Err(Error::config("agent harmonic_weight must be finite and non-negative"));
        }
        if self.ghost_after <= self.consolidate_after {
            return Err(Error::config("agent ghost_after must exceed consolidate_after"));
        }
        Ok(())
    }
}
