//! Feasibility predicates and the dry-run view used for trial scoring

use stepweave_core::{KernelConfig, Result, StateVector};

/// Nonzero norm and, for multi-axis vectors, a nonzero first difference
/// along at least one axis. Zero and constant vectors are absent.
pub fn presence(v: &StateVector) -> bool {
    if v.norm() <= 0.0 {
        return false;
    }
    let s = v.as_slice();
    if s.len() == 1 {
        return true;
    }
    s.windows(2).any(|w| w[1] - w[0] != 0.0)
}

/// True when the shapes differ or the Euclidean distance exceeds `epsilon`.
pub fn difference(a: &StateVector, b: &StateVector, epsilon: f64) -> bool {
    match a.distance(b) {
        Some(d) => d > epsilon,
        None => true,
    }
}

/// At least two candidate futures exist.
pub fn potential(futures: &[StateVector]) -> bool {
    futures.len() >= 2
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeasibilityRules {
    pub strict: bool,
    pub epsilon: f64,
}

impl Default for FeasibilityRules {
    fn default() -> Self {
        Self {
            strict: false,
            epsilon: 1e-3,
        }
    }
}

impl From<&KernelConfig> for FeasibilityRules {
    fn from(c: &KernelConfig) -> Self {
        Self {
            strict: c.strict,
            epsilon: c.difference_epsilon,
        }
    }
}

/// The feasibility gate.
///
/// `potential(futures)` always applies. Without a previous state the rest
/// reduces to `presence(curr)`; with one, the state must have moved. Strict
/// mode also rejects moves between two states that both lack presence.
pub fn feasible(
    curr: &StateVector,
    prev: Option<&StateVector>,
    futures: &[StateVector],
    rules: FeasibilityRules,
) -> bool {
    if !potential(futures) {
        return false;
    }
    let Some(prev) = prev else {
        return presence(curr);
    };
    let moved = difference(curr, prev, rules.epsilon);
    if !rules.strict {
        return moved;
    }
    moved && (presence(curr) || presence(prev))
}

/// Read-only copy of what a step needs: the committed tail and the rules.
///
/// Built under the kernel lock, then used without it, so trial steps never
/// touch the committed state.
#[derive(Debug, Clone)]
pub struct KernelView {
    pub(crate) current: StateVector,
    pub(crate) rules: FeasibilityRules,
    pub(crate) stabilize_threshold: Option<f64>,
}

impl KernelView {
    pub fn current(&self) -> &StateVector {
        &self.current
    }

    pub fn dim(&self) -> usize {
        self.current.dim()
    }

    /// The state a step would actually commit for `candidate`.
    pub fn project(&self, candidate: &StateVector) -> Result<StateVector> {
        candidate.ensure_dim(self.dim())?;
        Ok(stabilize(candidate, self.stabilize_threshold))
    }

    /// Would stepping to `candidate` leave the kernel feasible?
    pub fn would_be_feasible(
        &self,
        candidate: &StateVector,
        futures: &[StateVector],
    ) -> Result<bool> {
        let projected = self.project(candidate)?;
        Ok(feasible(&projected, Some(&self.current), futures, self.rules))
    }
}

/// Replace a positive-norm vector below `threshold` with the unit basis
/// vector along its dominant axis.
pub(crate) fn stabilize(candidate: &StateVector, threshold: Option<f64>) -> StateVector {
    let Some(threshold) = threshold else {
        return candidate.clone();
    };
    let norm = candidate.norm();
    if norm > 0.0 && norm < threshold {
        if let Ok(unit) = StateVector::unit(candidate.dim(), candidate.dominant_axis()) {
            tracing::debug!("stabilized state with norm {:.3e} below {:.3e}", norm, threshold);
            return unit;
        }
    }
    candidate.clone()
}
