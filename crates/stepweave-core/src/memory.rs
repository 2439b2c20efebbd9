//! Memory provider: optional tag-association collaborator
//!
//! The kernel enriches journal payloads with related tags, and the agent
//! boosts tags on the winning path. Both treat the provider as a black box
//! that may be absent.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

pub trait MemoryProvider: Send + Sync {
    /// Record an access to `tag`, raising its weight by `boost`.
    fn access(&self, tag: &str, boost: f64);
    /// Tags most strongly associated with `tag`, best first.
    fn retrieve(&self, tag: &str, top_k: usize) -> Vec<String>;
    /// Advance one cycle (decay, eviction).
    fn update_cycle(&self);
}

/// Bounded weighted tag cache.
///
/// Tags accessed within the same cycle become linked. Weights decay every
/// cycle; at capacity the lightest tag (oldest on ties) is evicted.
pub struct WeightedTagCache {
    inner: Mutex<CacheState>,
    capacity: usize,
    decay: f64,
}

#[derive(Default)]
struct CacheState {
    weights: HashMap<String, f64>,
    links: HashMap<String, HashMap<String, f64>>,
    last_touch: HashMap<String, u64>,
    recent: VecDeque<String>,
    clock: u64,
}

const RECENT_LIMIT: usize = 16;
const WEIGHT_FLOOR: f64 = 1e-3;

impl WeightedTagCache {
    pub fn new(capacity: usize, decay: f64) -> Self {
        Self {
            inner: Mutex::new(CacheState::default()),
            capacity: capacity.max(1),
            decay: decay.clamp(0.0, 1.0),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn weight(&self, tag: &str) -> Option<f64> {
        self.lock().weights.get(tag).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheState {
    fn evict_lightest(&mut self) {
        let victim = self
            .weights
            .iter()
            .min_by(|a, b| {
                a.1.total_cmp(b.1).then_with(|| {
                    let ta = self.last_touch.get(a.0).copied().unwrap_or(0);
                    let tb = self.last_touch.get(b.0).copied().unwrap_or(0);
                    ta.cmp(&tb)
                })
            })
            .map(|(k, _)| k.clone());
        if let Some(tag) = victim {
            self.remove(&tag);
            debug!("tag cache evicted {}", tag);
        }
    }

    fn remove(&mut self, tag: &str) {
        self.weights.remove(tag);
        self.last_touch.remove(tag);
        self.links.remove(tag);
        for neighbours in self.links.values_mut() {
            neighbours.remove(tag);
        }
        self.recent.retain(|t| t != tag);
    }
}

impl MemoryProvider for WeightedTagCache {
    fn access(&self, tag: &str, boost: f64) {
        let mut state = self.lock();
        state.clock += 1;
        let clock = state.clock;

        if !state.weights.contains_key(tag) && state.weights.len() >= self.capacity {
            state.evict_lightest();
        }
        *state.weights.entry(tag.to_string()).or_insert(0.0) += boost.max(0.0);
        state.last_touch.insert(tag.to_string(), clock);

        let peers: Vec<String> = state.recent.iter().filter(|t| *t != tag).cloned().collect();
        for peer in peers {
            *state
                .links
                .entry(tag.to_string())
                .or_default()
                .entry(peer.clone())
                .or_insert(0.0) += 1.0;
            *state
                .links
                .entry(peer)
                .or_default()
                .entry(tag.to_string())
                .or_insert(0.0) += 1.0;
        }

        state.recent.retain(|t| t != tag);
        state.recent.push_back(tag.to_string());
        while state.recent.len() > RECENT_LIMIT {
            state.recent.pop_front();
        }
    }

    fn retrieve(&self, tag: &str, top_k: usize) -> Vec<String> {
        let state = self.lock();
        let Some(neighbours) = state.links.get(tag) else {
            return Vec::new();
        };
        let mut scored: Vec<(&String, f64)> = neighbours
            .iter()
            .map(|(peer, link)| (peer, link * state.weights.get(peer).copied().unwrap_or(0.0)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored
            .into_iter()
            .take(top_k)
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    fn update_cycle(&self) {
        let mut state = self.lock();
        let decay = self.decay;
        state.weights.values_mut().for_each(|w| *w *= decay);
        let faded: Vec<String> = state
            .weights
            .iter()
            .filter(|(_, w)| **w < WEIGHT_FLOOR)
            .map(|(k, _)| k.clone())
            .collect();
        for tag in faded {
            state.remove(&tag);
        }
        state.recent.clear();
    }
}
