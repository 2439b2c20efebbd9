//! Promotion bookkeeping
//!
//! Counts how often a minimal relation wins alongside the same co-occurring
//! tags. At `consolidate_after` repeats the watcher is asked to merge the
//! path's relations; from `ghost_after` on, a ghost standing for the
//! co-occurring tags is registered and then reinforced.

use crate::candidate::PathCandidate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stepweave_watcher::RelationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PromotionKey {
    relation_signature: String,
    co_tags: Vec<String>,
}

/// Request produced for the agent to carry out on a watcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Promotion {
    Consolidate {
        watcher: usize,
        relations: Vec<RelationId>,
    },
    Ghost {
        watcher: usize,
        tag: String,
        origin: Vec<String>,
        /// False on the first request; later ones reinforce.
        reinforce: bool,
    },
}

#[derive(Debug, Clone)]
pub struct PromotionTracker {
    counts: HashMap<PromotionKey, u32>,
    consolidate_after: u32,
    ghost_after: u32,
    capacity: usize,
}

impl PromotionTracker {
    pub fn new(consolidate_after: u32, ghost_after: u32, capacity: usize) -> Self {
        Self {
            counts: HashMap::new(),
            consolidate_after: consolidate_after.max(1),
            ghost_after: ghost_after.max(consolidate_after + 1),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count the winning path and return any requests it triggers.
    pub fn record(&mut self, winner: &PathCandidate) -> Vec<Promotion> {
        let mut out = Vec::new();
        for p in winner.relations.iter().filter(|p| p.relation.is_minimal()) {
            let mut co_tags: Vec<String> = winner
                .relations
                .iter()
                .filter(|other| other.relation.id != p.relation.id || other.watcher != p.watcher)
                .flat_map(|other| other.relation.members.iter())
                .filter(|tag| !p.relation.contains(tag))
                .cloned()
                .collect();
            co_tags.sort();
            co_tags.dedup();
            if co_tags.is_empty() {
                continue;
            }

            let key = PromotionKey {
                relation_signature: p.relation.signature(),
                co_tags: co_tags.clone(),
            };
            if !self.counts.contains_key(&key) && self.counts.len() >= self.capacity {
                self.evict_rarest();
            }
            let count = self.counts.entry(key).or_insert(0);
            *count += 1;

            if *count >= self.ghost_after {
                out.push(Promotion::Ghost {
                    watcher: p.watcher,
                    tag: co_tags.join("+"),
                    origin: p.relation.members.clone(),
                    reinforce: *count > self.ghost_after,
                });
            } else if *count == self.consolidate_after {
                out.push(Promotion::Consolidate {
                    watcher: p.watcher,
                    relations: winner.ids_for(p.watcher),
                });
            }
        }
        out
    }

    fn evict_rarest(&mut self) {
        let rarest = self
            .counts
            .iter()
            .min_by_key(|(_, count)| **count)
            .map(|(key, _)| key.clone());
        if let Some(key) = rarest {
            self.counts.remove(&key);
        }
    }
}
