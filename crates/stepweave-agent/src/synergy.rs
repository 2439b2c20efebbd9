//! Synergy memory: cumulative score per path signature

use std::collections::{BTreeMap, HashMap};
use stepweave_core::metrics::names;
use stepweave_core::MetricsSink;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SynergyMemory {
    scores: HashMap<String, f64>,
    capacity: usize,
}

impl SynergyMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            scores: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn from_map(map: BTreeMap<String, f64>, capacity: usize) -> Self {
        let mut memory = Self::new(capacity);
        for (signature, score) in map {
            if score.is_finite() && score >= 0.0 {
                memory.scores.insert(signature, score);
            }
        }
        while memory.scores.len() > memory.capacity {
            memory.evict_weakest(None);
        }
        memory
    }

    pub fn get(&self, signature: &str) -> f64 {
        self.scores.get(signature).copied().unwrap_or(0.0)
    }

    /// Add a non-negative score. Negative or non-finite scores are ignored
    /// so totals never shrink.
    pub fn accumulate(&mut self, signature: &str, score: f64, metrics: &dyn MetricsSink) -> f64 {
        let score = if score.is_finite() { score.max(0.0) } else { 0.0 };
        if !self.scores.contains_key(signature) && self.scores.len() >= self.capacity {
            if let Some(evicted) = self.evict_weakest(Some(signature)) {
                metrics.incr(names::SYNERGY_EVICTED, 1);
                debug!("synergy memory full, evicted {}", evicted);
            }
        }
        let total = self.scores.entry(signature.to_string()).or_insert(0.0);
        *total += score;
        *total
    }

    fn evict_weakest(&mut self, keep: Option<&str>) -> Option<String> {
        let weakest = self
            .scores
            .iter()
            .filter(|(sig, _)| Some(sig.as_str()) != keep)
            .min_by(|a, b| a.1.total_cmp(b.1).then(a.0.cmp(b.0)))
            .map(|(sig, _)| sig.clone())?;
        self.scores.remove(&weakest);
        Some(weakest)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.scores.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}
