//! Sliding window of observed relation arities

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    entries: VecDeque<usize>,
    capacity: usize,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(4_096)),
            capacity: capacity.max(1),
        }
    }

    pub fn from_entries(entries: Vec<usize>, capacity: usize) -> Self {
        let mut window = Self::new(capacity);
        for arity in entries {
            window.push(arity);
        }
        window
    }

    pub fn push(&mut self, arity: usize) {
        self.entries.push_back(arity);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Fraction of higher-order entries; 1.0 when empty.
    pub fn ratio(&self) -> f64 {
        if self.entries.is_empty() {
            return 1.0;
        }
        let higher = self.entries.iter().filter(|&&a| a >= 3).count();
        higher as f64 / self.entries.len() as f64
    }

    /// Fraction of minimal (two-member) entries; 0.0 when empty.
    pub fn minimal_fraction(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let minimal = self.entries.iter().filter(|&&a| a == 2).count();
        minimal as f64 / self.entries.len() as f64
    }

    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<usize> {
        self.entries.iter().copied().collect()
    }
}
