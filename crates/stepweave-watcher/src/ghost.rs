//! Ghosts: speculative tags waiting to be seen

use crate::embedding::embed_tags;
use crate::relation::RelationId;
use serde::{Deserialize, Serialize};
use stepweave_core::StateVector;

/// Offspring are only spawned up to this generation.
pub const MAX_GENERATION: u8 = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ghost {
    pub tag: String,
    /// Tags this ghost was derived from; its direction in state space.
    pub origin: Vec<String>,
    pub strength: f64,
    pub last_seen: u64,
    /// Relation this ghost would extend when promoted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_of: Option<RelationId>,
    #[serde(default)]
    pub generation: u8,
}

impl Ghost {
    pub fn new(tag: impl Into<String>, origin: Vec<String>, strength: f64, cycle: u64) -> Self {
        Self {
            tag: tag.into(),
            origin,
            strength: strength.clamp(0.0, 1.0),
            last_seen: cycle,
            companion_of: None,
            generation: 0,
        }
    }

    /// Companion ghost for a minimal relation, keyed by the relation signature.
    pub fn companion(
        signature: &str,
        relation: RelationId,
        members: &[String],
        strength: f64,
        cycle: u64,
    ) -> Self {
        let prefix = &signature[..signature.len().min(8)];
        Self {
            companion_of: Some(relation),
            ..Self::new(format!("~{}", prefix), members.to_vec(), strength, cycle)
        }
    }

    /// Derived ghost spawned when this one ascends.
    pub fn offspring(&self, seed_strength: f64, cycle: u64) -> Option<Self> {
        if self.generation >= MAX_GENERATION {
            return None;
        }
        let mut origin = self.origin.clone();
        origin.push(self.tag.clone());
        Some(Self {
            generation: self.generation + 1,
            ..Self::new(format!("{}'", self.tag), origin, seed_strength * 0.5, cycle)
        })
    }

    /// Cosine similarity between the ghost's origin and `signal`.
    pub fn similarity(&self, signal: &StateVector) -> f64 {
        let origin: &[String] = if self.origin.is_empty() {
            std::slice::from_ref(&self.tag)
        } else {
            &self.origin
        };
        embed_tags(origin, signal.dim())
            .map(|v| v.cosine(signal))
            .unwrap_or(0.0)
    }

    pub fn unseen_for(&self, cycle: u64) -> u64 {
        cycle.saturating_sub(self.last_seen)
    }
}
