//! Engine: one kernel, one watcher and the agent, built from config
//!
//! All three share a single [`InMemoryMetrics`] sink and a
//! [`WeightedTagCache`] memory provider.

use crate::input::RelationSeed;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use stepweave_agent::{AgentCheckpoint, CycleReport, HarmonicBonus, PathSearchAgent};
use stepweave_core::{
    InMemoryMetrics, MemoryProvider, MetricsSink, Result, StateVector, StepweaveConfig, Tick,
    WeightedTagCache,
};
use stepweave_kernel::{IngestOutcome, JournalEntry, JournalStats, StateKernel};
use stepweave_watcher::{RelationWatcher, WatcherSnapshot};
use tracing::{debug, info, warn};

const MEMORY_CAPACITY: usize = 1_024;
const MEMORY_DECAY: f64 = 0.95;

pub struct Engine {
    config: StepweaveConfig,
    metrics: Arc<InMemoryMetrics>,
    memory: Arc<WeightedTagCache>,
    kernel: Arc<StateKernel>,
    watcher: Arc<RelationWatcher>,
    agent: PathSearchAgent,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub truncated: usize,
}

/// Point-in-time view of the whole engine, printed by the binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineSummary {
    pub cycles: u64,
    pub kernel_steps: u64,
    pub state: StateVector,
    pub feasible: bool,
    pub fault_count: u32,
    pub relations: usize,
    pub ghosts: usize,
    pub window_size: usize,
    pub decay_rate: f64,
    pub depth: usize,
    pub synergy_entries: usize,
    pub journal: JournalStats,
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
}

/// Default starting state: component `i` is `1 / (i + 1)`.
pub fn initial_vector(dim: usize) -> Result<StateVector> {
    StateVector::new((0..dim).map(|i| 1.0 / (i as f64 + 1.0)).collect())
}

impl Engine {
    pub fn new(config: StepweaveConfig, initial: StateVector) -> Result<Self> {
        Self::with_snapshot(config, initial, None)
    }

    /// Build the engine, restoring the watcher from `snapshot` when given.
    pub fn with_snapshot(
        config: StepweaveConfig,
        initial: StateVector,
        snapshot: Option<WatcherSnapshot>,
    ) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(InMemoryMetrics::new());
        let memory = Arc::new(WeightedTagCache::new(MEMORY_CAPACITY, MEMORY_DECAY));
        let sink: Arc<dyn MetricsSink> = metrics.clone();
        let provider: Arc<dyn MemoryProvider> = memory.clone();

        let kernel = Arc::new(
            StateKernel::new(initial, &config)?
                .with_metrics(sink.clone())
                .with_memory(provider.clone()),
        );
        let watcher = match snapshot {
            Some(snapshot) => RelationWatcher::from_snapshot(snapshot, &config.watcher)?,
            None => RelationWatcher::new(&config.watcher)?,
        };
        let watcher = Arc::new(watcher.with_metrics(sink.clone()));

        let mut agent = PathSearchAgent::new(kernel.clone(), vec![watcher.clone()], &config.agent)?
            .with_metrics(sink)
            .with_memory(provider);
        if config.agent.harmonic_weight > 0.0 {
            agent = agent.with_term(Box::new(HarmonicBonus {
                weight: config.agent.harmonic_weight,
            }));
        }

        info!(
            "engine ready: dim {}, {} relation(s)",
            kernel.dim(),
            watcher.len()
        );
        Ok(Self {
            config,
            metrics,
            memory,
            kernel,
            watcher,
            agent,
        })
    }

    pub fn config(&self) -> &StepweaveConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<InMemoryMetrics> {
        &self.metrics
    }

    pub fn memory(&self) -> &Arc<WeightedTagCache> {
        &self.memory
    }

    pub fn kernel(&self) -> &Arc<StateKernel> {
        &self.kernel
    }

    pub fn watcher(&self) -> &Arc<RelationWatcher> {
        &self.watcher
    }

    pub fn agent(&self) -> &PathSearchAgent {
        &self.agent
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    pub fn ingest_ticks(&self, ticks: &[Tick]) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for tick in ticks {
            match self.kernel.ingest(tick) {
                IngestOutcome::Accepted { truncated, .. } => {
                    summary.accepted += 1;
                    if truncated {
                        summary.truncated += 1;
                    }
                }
                IngestOutcome::Rejected(reason) => {
                    summary.rejected += 1;
                    debug!("tick {} rejected: {:?}", tick.sequence_id, reason);
                }
            }
        }
        info!(
            "ingested {} tick(s): {} accepted, {} rejected",
            ticks.len(),
            summary.accepted,
            summary.rejected
        );
        summary
    }

    /// Register seed relations, returning how many were accepted. Invalid
    /// seeds are logged and skipped.
    pub fn register_seeds(&self, seeds: Vec<RelationSeed>) -> usize {
        let total = seeds.len();
        let mut registered = 0;
        for seed in seeds {
            match self
                .watcher
                .register(seed.members, seed.strength, seed.priority, seed.flags)
            {
                Ok(_) => registered += 1,
                Err(e) => warn!("seed relation skipped: {}", e),
            }
        }
        info!("registered {}/{} seed relation(s)", registered, total);
        registered
    }

    // ------------------------------------------------------------------
    // Cycles
    // ------------------------------------------------------------------

    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        self.agent.cycle()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub fn checkpoint(&self) -> AgentCheckpoint {
        self.agent.checkpoint()
    }

    pub fn save_checkpoint(&self, path: &Path) -> Result<()> {
        self.agent.checkpoint().save(path)
    }

    pub fn restore_checkpoint(&mut self, path: &Path) -> Result<()> {
        let checkpoint = AgentCheckpoint::load(path)?;
        self.agent.restore_checkpoint(checkpoint)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        self.watcher.to_snapshot().save(path)
    }

    /// Write the journal ring buffer as a JSON array.
    pub fn export_journal(&self, path: &Path) -> Result<usize> {
        let entries = self.kernel.export_entries();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, json)?;
        info!("exported {} journal entries to {}", entries.len(), path.display());
        Ok(entries.len())
    }

    /// Load exported entries into the journal and return the sequence ids
    /// that fail verification.
    pub fn import_journal(&self, path: &Path) -> Result<Vec<u64>> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<JournalEntry> = serde_json::from_str(&content)?;
        self.kernel.import_entries(entries);
        Ok(self.kernel.verify_entries())
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            cycles: self.agent.cycle_count(),
            kernel_steps: self.kernel.steps(),
            state: self.kernel.current(),
            feasible: self.kernel.is_feasible(),
            fault_count: self.kernel.fault_count(),
            relations: self.watcher.len(),
            ghosts: self.watcher.ghosts().len(),
            window_size: self.watcher.window_size(),
            decay_rate: self.watcher.decay_rate(),
            depth: self.agent.depth(),
            synergy_entries: self.agent.synergy().len(),
            journal: self.kernel.journal_stats(),
            counters: self.metrics.counters(),
            gauges: self.metrics.gauges(),
        }
    }
}
