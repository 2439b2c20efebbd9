//! Candidate scoring
//!
//! A score starts from the dry-run feasibility gate (1.0 or 0.0), adds the
//! bounded synergy bonus, then is scaled by time decay, the transient
//! penalty and the path's mean priority. Optional [`ScoringTerm`]s are added
//! last and are skipped while the agent is throttled.

use crate::candidate::{relation_weight, PathCandidate};
use stepweave_core::{AgentConfig, Result, StateVector};
use stepweave_kernel::KernelView;

/// A pluggable additive term. Must be cheap and free of side effects; terms
/// may run on several threads at once.
pub trait ScoringTerm: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, candidate: &PathCandidate, trial: &StateVector) -> f64;
}

/// Rewards trials aligned with a fixed harmonic profile `1, 1/2, 1/3, ...`.
#[derive(Debug, Clone, Copy)]
pub struct HarmonicBonus {
    pub weight: f64,
}

impl Default for HarmonicBonus {
    fn default() -> Self {
        Self { weight: 0.1 }
    }
}

impl ScoringTerm for HarmonicBonus {
    fn name(&self) -> &str {
        "harmonic"
    }

    fn score(&self, _candidate: &PathCandidate, trial: &StateVector) -> f64 {
        let profile: Vec<f64> = (0..trial.dim()).map(|i| 1.0 / (i + 1) as f64).collect();
        match StateVector::new(profile) {
            Ok(profile) => self.weight * trial.cosine(&profile).max(0.0),
            Err(_) => 0.0,
        }
    }
}

/// Everything a score needs besides the candidate itself.
pub struct ScoreInputs<'a> {
    pub view: &'a KernelView,
    pub futures: &'a [StateVector],
    pub context_ratio: f64,
    pub config: &'a AgentConfig,
    pub terms: &'a [Box<dyn ScoringTerm>],
    pub extra_terms: bool,
}

/// Build the trial state for a path: the current state plus each
/// relation's embedding scaled by its weight, plus `noise`.
pub fn trial_state(
    current: &StateVector,
    candidate: &PathCandidate,
    curvature_bias: f64,
    noise: &[f64],
) -> Result<StateVector> {
    let dim = current.dim();
    let mut trial = current.clone();
    for p in &candidate.relations {
        let direction = p.relation.embed(dim)?;
        trial = trial.add_scaled(&direction, relation_weight(p, curvature_bias))?;
    }
    if !noise.is_empty() {
        let noise = StateVector::new(noise.to_vec())?;
        trial = trial.add_scaled(&noise, 1.0)?;
    }
    Ok(trial)
}

/// Sigmoid-shaped penalty factor, harsher at low context ratio. Only
/// minimal, non-exempt relations count.
pub fn transient_penalty(candidate: &PathCandidate, context_ratio: f64) -> f64 {
    let per_relation = 0.2 / (1.0 + (5.0 * (context_ratio - 0.5)).exp());
    let count = candidate
        .relations
        .iter()
        .filter(|p| p.relation.is_minimal() && !p.relation.exempt)
        .count();
    (1.0 - per_relation * count as f64).max(0.0)
}

pub fn score_candidate(
    inputs: &ScoreInputs<'_>,
    candidate: &PathCandidate,
    trial: &StateVector,
    synergy: f64,
) -> Result<f64> {
    let config = inputs.config;
    let mut score = if inputs.view.would_be_feasible(trial, inputs.futures)? {
        1.0
    } else {
        0.0
    };

    score += if config.normalize_synergy {
        synergy.tanh()
    } else {
        synergy * config.synergy_scale
    };

    if config.time_decay {
        let age: f64 = candidate.relations.iter().map(|p| p.age as f64).sum();
        score *= (-age * config.age_scale).exp();
    }

    score *= transient_penalty(candidate, inputs.context_ratio);

    if !candidate.is_empty() {
        let priority: f64 = candidate.relations.iter().map(|p| p.clamped_priority()).sum();
        score *= priority / candidate.len() as f64;
    }

    if inputs.extra_terms {
        for term in inputs.terms {
            score += term.score(candidate, trial);
        }
    }

    Ok(if score.is_finite() { score.max(0.0) } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_without_minimal_relations_are_not_penalized() {
        let empty = PathCandidate::new(Vec::new());
        assert_eq!(transient_penalty(&empty, 0.0), 1.0);
        assert_eq!(transient_penalty(&empty, 1.0), 1.0);
    }

    #[test]
    fn harmonic_bonus_prefers_profile() {
        let bonus = HarmonicBonus::default();
        let empty = PathCandidate::new(Vec::new());
        let aligned = StateVector::new(vec![1.0, 0.5, 1.0 / 3.0]).unwrap();
        let opposed = StateVector::new(vec![-1.0, -0.5, -1.0 / 3.0]).unwrap();
        assert!((bonus.score(&empty, &aligned) - 0.1).abs() < 1e-9);
        assert_eq!(bonus.score(&empty, &opposed), 0.0);
    }
}
