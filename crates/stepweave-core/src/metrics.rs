//! Metrics hooks
//!
//! The core only talks to [`MetricsSink`]. Exporters live outside and read
//! whatever sink they installed; [`InMemoryMetrics`] is the readable default.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Counter and gauge names emitted by the core.
pub mod names {
    pub const RELATION_PRUNED: &str = "watcher.relation.pruned";
    pub const RELATION_PROMOTED: &str = "watcher.relation.promoted";
    pub const RELATION_DECAYED: &str = "watcher.relation.decayed";
    pub const RELATION_REJECTED: &str = "watcher.relation.rejected";
    pub const RELATION_EVICTED: &str = "watcher.relation.evicted";
    pub const GHOST_PROMOTED: &str = "watcher.ghost.promoted";
    pub const GHOST_EVICTED: &str = "watcher.ghost.evicted";
    pub const AUTH_FAILURES: &str = "kernel.journal.auth_failures";
    pub const SEQUENCE_REJECTED: &str = "kernel.journal.sequence_rejected";
    pub const JOURNAL_TRUNCATED: &str = "kernel.journal.truncated";
    pub const JOURNAL_EVICTED: &str = "kernel.journal.evicted";
    pub const STEP_REJECTED: &str = "kernel.step.rejected";
    pub const SUPPRESSIONS: &str = "kernel.suppressions";
    pub const TRIAL_FAILURES: &str = "agent.trial.failures";
    pub const SYNERGY_EVICTED: &str = "agent.synergy.evicted";
    pub const THROTTLES: &str = "agent.throttles";

    pub const CONTEXT_RATIO: &str = "watcher.context_ratio";
    pub const CURRENT_DEPTH: &str = "agent.depth";
    pub const STEP_LATENCY_MS: &str = "agent.cycle_latency_ms";
    pub const FEASIBLE: &str = "kernel.feasible";
}

/// Sink for counters and gauges. Implementations must be cheap and
/// must not call back into the core.
pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &'static str, by: u64);
    fn gauge(&self, name: &'static str, value: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr(&self, _name: &'static str, _by: u64) {}
    fn gauge(&self, _name: &'static str, _value: f64) {}
}

/// Lock-free in-process registry.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: DashMap<&'static str, u64>,
    gauges: DashMap<&'static str, f64>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).map(|v| *v)
    }

    /// Ordered copy of every counter, for exporters and the CLI summary.
    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|e| (e.key().to_string(), *e.value()))
            .collect()
    }

    pub fn gauges(&self) -> BTreeMap<String, f64> {
        self.gauges
            .iter()
            .map(|e| (e.key().to_string(), *e.value()))
            .collect()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn incr(&self, name: &'static str, by: u64) {
        *self.counters.entry(name).or_insert(0) += by;
    }

    fn gauge(&self, name: &'static str, value: f64) {
        self.gauges.insert(name, value);
    }
}

pub fn noop() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_accumulates_counters() {
        let m = InMemoryMetrics::new();
        m.incr(names::RELATION_PRUNED, 2);
        m.incr(names::RELATION_PRUNED, 3);
        assert_eq!(m.counter(names::RELATION_PRUNED), 5);
        assert_eq!(m.counter(names::GHOST_PROMOTED), 0);
    }

    #[test]
    fn gauges_keep_last_value() {
        let m = InMemoryMetrics::new();
        m.gauge(names::CONTEXT_RATIO, 0.25);
        m.gauge(names::CONTEXT_RATIO, 0.75);
        assert_eq!(m.gauge_value(names::CONTEXT_RATIO), Some(0.75));
        assert!(m.gauge_value(names::CURRENT_DEPTH).is_none());
    }
}
