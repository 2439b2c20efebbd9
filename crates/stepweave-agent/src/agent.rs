//! PathSearchAgent: one bounded search-and-commit step per cycle
//!
//! The agent owns only its synergy memory, promotion counts, depth control
//! and RNG. Kernel and watchers are touched exclusively through their public
//! operations, one call at a time.

use crate::candidate::{enumerate_paths, PathCandidate, PathRelation};
use crate::checkpoint::{AgentCheckpoint, CHECKPOINT_VERSION};
use crate::depth::{DepthChange, DepthController};
use crate::promotion::{Promotion, PromotionTracker};
use crate::scoring::{score_candidate, trial_state, ScoreInputs, ScoringTerm};
use crate::synergy::SynergyMemory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use stepweave_core::metrics::{self, names};
use stepweave_core::{
    ensure_disjoint, AgentConfig, Component, Error, MemoryProvider, MetricsSink, Result,
    StateVector,
};
use stepweave_kernel::{Feedback, FeedbackInput, StateKernel};
use stepweave_watcher::RelationWatcher;
use tracing::{debug, info, warn};

pub struct PathSearchAgent {
    kernel: Arc<StateKernel>,
    watchers: Vec<Arc<RelationWatcher>>,
    config: AgentConfig,
    metrics: Arc<dyn MetricsSink>,
    memory: Option<Arc<dyn MemoryProvider>>,
    terms: Vec<Box<dyn ScoringTerm>>,
    rng: StdRng,
    synergy: SynergyMemory,
    promotions: PromotionTracker,
    depth: DepthController,
    cycle_count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub candidates: usize,
    /// Depth used for this cycle's enumeration.
    pub depth: usize,
    pub depth_change: DepthChange,
    pub best_score: f64,
    pub signature: Option<String>,
    /// No scorable candidate existed; a random perturbation was committed.
    pub fallback: bool,
    pub feasible: bool,
    pub latency_ms: f64,
    pub throttled: bool,
    pub context_ratio: f64,
    pub promotions: Vec<Promotion>,
    pub feedback: Feedback,
}

impl Component for PathSearchAgent {
    const NAME: &'static str = "PathSearchAgent";
    const OPERATIONS: &'static [&'static str] = &["cycle", "checkpoint", "restore_checkpoint"];
}

impl PathSearchAgent {
    pub fn new(
        kernel: Arc<StateKernel>,
        watchers: Vec<Arc<RelationWatcher>>,
        config: &AgentConfig,
    ) -> Result<Self> {
        config.validate()?;
        ensure_disjoint::<Self, StateKernel>()?;
        ensure_disjoint::<Self, RelationWatcher>()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            "path search agent ready: {} watcher(s), depth {}",
            watchers.len(),
            config.max_depth
        );
        Ok(Self {
            kernel,
            watchers,
            config: config.clone(),
            metrics: metrics::noop(),
            memory: None,
            terms: Vec::new(),
            rng,
            synergy: SynergyMemory::new(config.synergy_capacity),
            promotions: PromotionTracker::new(
                config.consolidate_after,
                config.ghost_after,
                config.synergy_capacity,
            ),
            depth: DepthController::new(config),
            cycle_count: 0,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Add an optional scoring term. Terms are skipped while throttled.
    pub fn with_term(mut self, term: Box<dyn ScoringTerm>) -> Self {
        debug!("scoring term '{}' enabled", term.name());
        self.terms.push(term);
        self
    }

    pub fn kernel(&self) -> &Arc<StateKernel> {
        &self.kernel
    }

    pub fn watchers(&self) -> &[Arc<RelationWatcher>] {
        &self.watchers
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn depth(&self) -> usize {
        self.depth.depth()
    }

    pub fn synergy(&self) -> &SynergyMemory {
        &self.synergy
    }

    // ------------------------------------------------------------------
    // Cycle
    // ------------------------------------------------------------------

    pub fn cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        self.cycle_count += 1;

        let (pool, ratios) = self.collect_relations();
        let context_ratio = mean(&ratios).unwrap_or(1.0);
        let view = self.kernel.view();
        let dim = view.dim();
        let depth = self.depth.depth();
        let throttled = self.depth.throttled();

        let candidates = enumerate_paths(
            pool,
            depth,
            self.config.beam_width,
            self.config.max_paths,
            self.config.curvature_bias,
        );

        let mut trials: Vec<Option<StateVector>> = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let noise = perturbation(&mut self.rng, dim, self.config.noise);
            match trial_state(view.current(), candidate, self.config.curvature_bias, &noise) {
                Ok(trial) => trials.push(Some(trial)),
                Err(e) => {
                    self.metrics.incr(names::TRIAL_FAILURES, 1);
                    debug!("trial for {} failed: {}", candidate.signature(), e);
                    trials.push(None);
                }
            }
        }
        let futures: Vec<StateVector> = trials.iter().flatten().cloned().collect();
        self.kernel.set_futures(futures.clone())?;

        let synergies: Vec<f64> = candidates
            .iter()
            .map(|c| self.synergy.get(c.signature()))
            .collect();
        let inputs = ScoreInputs {
            view: &view,
            futures: &futures,
            context_ratio,
            config: &self.config,
            terms: &self.terms,
            extra_terms: !throttled,
        };
        let parallel = candidates.len() >= self.config.parallel_threshold.max(2);
        let scores = score_all(
            &inputs,
            &candidates,
            &trials,
            &synergies,
            parallel,
            self.metrics.as_ref(),
        );

        // Highest score wins; ties go to the earliest candidate.
        let best = scores
            .iter()
            .enumerate()
            .filter(|(i, _)| trials[*i].is_some())
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, s)| (i, *s));

        let chosen = best.and_then(|(i, s)| trials[i].clone().map(|t| (t, i, s)));
        let (target, winner, best_score) = match chosen {
            Some((trial, i, score)) => (trial, Some(&candidates[i]), score),
            None => {
                debug!("no scorable path, committing fallback perturbation");
                (self.fallback_state(view.current())?, None, 0.0)
            }
        };

        let feasible = self.kernel.step(target)?;
        let committed = self.kernel.current();

        for (idx, watcher) in self.watchers.iter().enumerate() {
            if let Some(winner) = winner {
                watcher.mark_used(&winner.ids_for(idx));
            }
            watcher.observe(&committed);
        }

        let mut promotions = Vec::new();
        if let Some(winner) = winner {
            let total = self
                .synergy
                .accumulate(winner.signature(), best_score, self.metrics.as_ref());
            debug!("path {} scored {:.4}, synergy {:.4}", winner.signature(), best_score, total);
            promotions = self.promotions.record(winner);
            for promotion in &promotions {
                self.apply_promotion(promotion, &committed);
            }
        }

        let dispersion = stdev(&scores);
        let context_variance = stdev(&ratios).powi(2);
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let depth_change = self.depth.observe(dispersion, context_variance, latency_ms);
        match depth_change {
            DepthChange::Throttled => {
                self.metrics.incr(names::THROTTLES, 1);
                warn!(
                    "cycle took {:.2}ms over budget {:.2}ms, depth lowered to {}",
                    latency_ms,
                    self.config.latency_budget_ms,
                    self.depth.depth()
                );
            }
            DepthChange::Restored => info!("throttle cooldown over, optional terms restored"),
            DepthChange::Raised | DepthChange::Lowered => {
                debug!("depth {:?} to {}", depth_change, self.depth.depth())
            }
            DepthChange::Held => {}
        }

        self.kernel.update(best_score, context_ratio, latency_ms)?;
        let tags = winner.map(PathCandidate::tags).unwrap_or_default();
        let memory_signal = self.touch_memory(&tags, best_score);
        let feedback = self.kernel.receive_feedback(FeedbackInput {
            context_ratio,
            entropy_signal: dispersion,
            fault_count: 0,
            latency_ms,
            load: candidates.len() as f64 / self.config.max_paths as f64,
            memory_signal,
        });

        self.metrics.gauge(names::CURRENT_DEPTH, self.depth.depth() as f64);
        self.metrics.gauge(names::STEP_LATENCY_MS, latency_ms);

        Ok(CycleReport {
            cycle: self.cycle_count,
            candidates: candidates.len(),
            depth,
            depth_change,
            best_score,
            signature: winner.map(|w| w.signature().to_string()),
            fallback: winner.is_none(),
            feasible,
            latency_ms,
            throttled,
            context_ratio,
            promotions,
            feedback,
        })
    }

    fn collect_relations(&self) -> (Vec<PathRelation>, Vec<f64>) {
        let mut pool = Vec::new();
        let mut ratios = Vec::with_capacity(self.watchers.len());
        for (idx, watcher) in self.watchers.iter().enumerate() {
            ratios.push(watcher.context_ratio());
            let cycle = watcher.cycle();
            let max_priority = watcher.config().max_priority;
            pool.extend(watcher.relations().into_iter().map(|relation| PathRelation {
                watcher: idx,
                age: relation.age(cycle),
                relation,
                max_priority,
            }));
        }
        (pool, ratios)
    }

    fn fallback_state(&mut self, current: &StateVector) -> Result<StateVector> {
        let dim = current.dim();
        let mut delta = perturbation(&mut self.rng, dim, self.config.fallback_magnitude);
        if delta.is_empty() {
            delta = vec![0.0; dim];
        }
        current.add_scaled(&StateVector::new(delta)?, 1.0)
    }

    fn apply_promotion(&self, promotion: &Promotion, signal: &StateVector) {
        match promotion {
            Promotion::Consolidate { watcher, relations } => {
                let Some(w) = self.watchers.get(*watcher) else {
                    return;
                };
                match w.consolidate(relations) {
                    Ok(Some(id)) => info!("relations {:?} consolidated into {}", relations, id),
                    Ok(None) => debug!("consolidation of {:?} too small", relations),
                    Err(e) => warn!("consolidation failed: {}", e),
                }
            }
            Promotion::Ghost {
                watcher,
                tag,
                origin,
                reinforce,
            } => {
                let Some(w) = self.watchers.get(*watcher) else {
                    return;
                };
                if *reinforce && w.ghost(tag).is_some() {
                    if let Some(id) = w.reinforce(tag, signal) {
                        info!("ghost {} ascended into {}", tag, id);
                    }
                } else if let Err(e) =
                    w.register_ghost(tag, origin, w.config().ghost_seed_strength)
                {
                    warn!("ghost registration failed: {}", e);
                }
            }
        }
    }

    /// Boost the winning tags and return the share that have associations.
    fn touch_memory(&self, tags: &[String], score: f64) -> Option<f64> {
        let memory = self.memory.as_ref()?;
        let mut associated = 0usize;
        for tag in tags {
            memory.access(tag, 1.0 + score);
            if !memory.retrieve(tag, 1).is_empty() {
                associated += 1;
            }
        }
        memory.update_cycle();
        Some(if tags.is_empty() {
            0.0
        } else {
            associated as f64 / tags.len() as f64
        })
    }

    // ------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------

    pub fn checkpoint(&self) -> AgentCheckpoint {
        AgentCheckpoint {
            version: CHECKPOINT_VERSION,
            cycle_count: self.cycle_count,
            synergy_memory: self.synergy.to_map(),
            kernel_state: self.kernel.current(),
            depth: Some(self.depth.depth()),
        }
    }

    pub fn restore_checkpoint(&mut self, checkpoint: AgentCheckpoint) -> Result<()> {
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(Error::SnapshotVersion {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        self.kernel.restore(checkpoint.kernel_state)?;
        self.synergy =
            SynergyMemory::from_map(checkpoint.synergy_memory, self.config.synergy_capacity);
        self.cycle_count = checkpoint.cycle_count;
        if let Some(depth) = checkpoint.depth {
            self.depth.set_depth(depth);
        }
        info!(
            "agent restored at cycle {} with {} synergy entries",
            self.cycle_count,
            self.synergy.len()
        );
        Ok(())
    }
}

fn score_all(
    inputs: &ScoreInputs<'_>,
    candidates: &[PathCandidate],
    trials: &[Option<StateVector>],
    synergies: &[f64],
    parallel: bool,
    metrics: &dyn MetricsSink,
) -> Vec<f64> {
    let score_one = |i: usize| -> f64 {
        let Some(trial) = &trials[i] else {
            return 0.0;
        };
        match score_candidate(inputs, &candidates[i], trial, synergies[i]) {
            Ok(score) => score,
            Err(e) => {
                metrics.incr(names::TRIAL_FAILURES, 1);
                debug!("scoring {} failed: {}", candidates[i].signature(), e);
                0.0
            }
        }
    };

    if !parallel {
        return (0..candidates.len()).map(score_one).collect();
    }

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let chunk = ((candidates.len() + workers - 1) / workers).max(1);
    let indices: Vec<usize> = (0..candidates.len()).collect();
    let score_one = &score_one;
    std::thread::scope(|scope| {
        let handles: Vec<_> = indices
            .chunks(chunk)
            .map(|part| {
                let handle = scope
                    .spawn(move || part.iter().map(|&i| score_one(i)).collect::<Vec<f64>>());
                (part.len(), handle)
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|(len, handle)| handle.join().unwrap_or_else(|_| vec![0.0; len]))
            .collect()
    })
}

/// Uniform noise in `[-magnitude, magnitude]`; empty when magnitude is not
/// positive.
fn perturbation(rng: &mut StdRng, dim: usize, magnitude: f64) -> Vec<f64> {
    if !(magnitude.is_finite() && magnitude > 0.0) {
        return Vec::new();
    }
    (0..dim).map(|_| rng.gen_range(-magnitude..=magnitude)).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn stdev(values: &[f64]) -> f64 {
    let Some(m) = mean(values) else {
        return 0.0;
    };
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
