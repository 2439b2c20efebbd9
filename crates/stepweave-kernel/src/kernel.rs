//! StateKernel: the authoritative state vector and everything gated on it
//!
//! One mutex guards the history, feasibility flag, adaptive parameters and
//! journal. Every public operation takes the lock once and never calls out
//! to another component while holding it, except the optional memory
//! provider during tick enrichment.

use crate::adaptive::{AdaptiveParams, Feedback, FeedbackInput, ParamsSnapshot};
use crate::feasibility::{self, FeasibilityRules, KernelView};
use crate::journal::{IngestOutcome, Journal, JournalEntry, JournalStats};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use stepweave_core::metrics::{self, names};
use stepweave_core::{
    Component, JournalConfig, KernelConfig, MemoryProvider, MetricsSink, Result, StateVector,
    StepweaveConfig, Tick,
};
use tracing::{debug, info, warn};

pub struct StateKernel {
    inner: Mutex<KernelState>,
    config: KernelConfig,
    journal_config: JournalConfig,
    metrics: Arc<dyn MetricsSink>,
    memory: Option<Arc<dyn MemoryProvider>>,
}

struct KernelState {
    dim: usize,
    current: StateVector,
    /// Committed states before `current`, oldest first.
    past: VecDeque<StateVector>,
    futures: Vec<StateVector>,
    feasible: bool,
    params: AdaptiveParams,
    journal: Journal,
    fault_count: u32,
    steps: u64,
}

impl Component for StateKernel {
    const NAME: &'static str = "StateKernel";
    const OPERATIONS: &'static [&'static str] = &[
        "step",
        "set_futures",
        "restore",
        "update",
        "receive_feedback",
        "set_rho",
        "set_lambda",
        "signal_suppression",
        "ingest",
        "export_entries",
        "verify_entries",
        "import_entries",
    ];
}

impl StateKernel {
    pub fn new(initial: StateVector, config: &StepweaveConfig) -> Result<Self> {
        config.kernel.validate()?;
        config.journal.validate()?;
        let params = AdaptiveParams::new(&config.kernel)?;
        let rules = FeasibilityRules::from(&config.kernel);
        let feasible = feasibility::feasible(&initial, None, &[], rules);

        Ok(Self {
            inner: Mutex::new(KernelState {
                dim: initial.dim(),
                current: initial,
                past: VecDeque::with_capacity(config.kernel.history_capacity.min(4_096)),
                futures: Vec::new(),
                feasible,
                params,
                journal: Journal::new(config.journal.capacity),
                fault_count: 0,
                steps: 0,
            }),
            config: config.kernel.clone(),
            journal_config: config.journal.clone(),
            metrics: metrics::noop(),
            memory: None,
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

    pub fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rules(&self) -> FeasibilityRules {
        FeasibilityRules::from(&self.config)
    }

    fn stabilize_threshold(&self, params: &AdaptiveParams) -> Option<f64> {
        self.config.stabilize.then(|| {
            self.config
                .stabilize_floor
                .max(params.dynamic_threshold() * self.config.stabilize_scale)
        })
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Commit `candidate`. Returns the recomputed feasibility flag.
    pub fn step(&self, candidate: StateVector) -> Result<bool> {
        let mut state = self.lock();
        if let Err(e) = candidate.ensure_dim(state.dim) {
            self.metrics.incr(names::STEP_REJECTED, 1);
            return Err(e);
        }

        let committed = feasibility::stabilize(&candidate, self.stabilize_threshold(&state.params));
        let feasible =
            feasibility::feasible(&committed, Some(&state.current), &state.futures, self.rules());

        let prev = std::mem::replace(&mut state.current, committed);
        state.past.push_back(prev);
        while state.past.len() + 1 > self.config.history_capacity {
            state.past.pop_front();
        }
        state.feasible = feasible;
        state.steps += 1;
        self.metrics
            .gauge(names::FEASIBLE, if feasible { 1.0 } else { 0.0 });
        debug!("kernel step {} feasible={}", state.steps, feasible);
        Ok(feasible)
    }

    /// Validate raw components, then step. Non-finite input leaves the
    /// kernel untouched.
    pub fn step_components(&self, components: Vec<f64>) -> Result<bool> {
        match StateVector::new(components) {
            Ok(v) => self.step(v),
            Err(e) => {
                self.metrics.incr(names::STEP_REJECTED, 1);
                warn!("step rejected: {}", e);
                Err(e)
            }
        }
    }

    /// Candidate futures used by the next feasibility recomputation.
    pub fn set_futures(&self, futures: Vec<StateVector>) -> Result<()> {
        let mut state = self.lock();
        for f in &futures {
            f.ensure_dim(state.dim)?;
        }
        state.futures = futures;
        Ok(())
    }

    /// Reset history to a single checkpointed state.
    pub fn restore(&self, vector: StateVector) -> Result<()> {
        let mut state = self.lock();
        vector.ensure_dim(state.dim)?;
        state.feasible = feasibility::feasible(&vector, None, &state.futures, self.rules());
        state.past.clear();
        state.current = vector;
        info!("kernel restored from checkpoint");
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.lock().dim
    }

    pub fn current(&self) -> StateVector {
        self.lock().current.clone()
    }

    pub fn previous(&self) -> Option<StateVector> {
        self.lock().past.back().cloned()
    }

    /// Every retained state, oldest first, ending with the current one.
    pub fn history(&self) -> Vec<StateVector> {
        let state = self.lock();
        state
            .past
            .iter()
            .chain(std::iter::once(&state.current))
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.lock().past.len() + 1
    }

    pub fn steps(&self) -> u64 {
        self.lock().steps
    }

    pub fn is_feasible(&self) -> bool {
        self.lock().feasible
    }

    /// Detached copy for dry-run trial steps.
    pub fn view(&self) -> KernelView {
        let state = self.lock();
        KernelView {
            current: state.current.clone(),
            rules: self.rules(),
            stabilize_threshold: self.stabilize_threshold(&state.params),
        }
    }

    // ------------------------------------------------------------------
    // Adaptive control
    // ------------------------------------------------------------------

    pub fn update(&self, signal: f64, secondary: f64, latency_ms: f64) -> Result<()> {
        self.lock().params.update(signal, secondary, latency_ms)
    }

    pub fn receive_feedback(&self, mut input: FeedbackInput) -> Feedback {
        let mut state = self.lock();
        input.fault_count = input.fault_count.max(state.fault_count);
        if self.memory.is_none() {
            input.memory_signal = None;
        }
        state.params.receive_feedback(input, &self.config)
    }

    pub fn set_rho(&self, value: f64) -> Result<()> {
        self.lock().params.set_rho(value)
    }

    pub fn set_lambda(&self, value: f64) -> Result<()> {
        self.lock().params.set_lambda(value)
    }

    pub fn params(&self) -> ParamsSnapshot {
        self.lock().params.snapshot()
    }

    /// Record a suppression signal. Logged and counted as a fault; the
    /// committed state is never zeroed.
    pub fn signal_suppression(&self, reason: &str) {
        let mut state = self.lock();
        state.fault_count = state.fault_count.saturating_add(1);
        self.metrics.incr(names::SUPPRESSIONS, 1);
        warn!("suppression signalled ({}), fault count {}", reason, state.fault_count);
    }

    pub fn fault_count(&self) -> u32 {
        self.lock().fault_count
    }

    // ------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------

    pub fn ingest(&self, tick: &Tick) -> IngestOutcome {
        let mut state = self.lock();
        let memory = self.memory.as_deref();
        state
            .journal
            .ingest(tick, &self.journal_config, memory, self.metrics.as_ref())
    }

    pub fn export_entries(&self) -> Vec<JournalEntry> {
        self.lock().journal.export_entries()
    }

    pub fn verify_entries(&self) -> Vec<u64> {
        self.lock().journal.verify_entries()
    }

    pub fn import_entries(&self, entries: Vec<JournalEntry>) {
        self.lock().journal.import_entries(entries)
    }

    pub fn journal_stats(&self) -> JournalStats {
        self.lock().journal.stats()
    }
}
