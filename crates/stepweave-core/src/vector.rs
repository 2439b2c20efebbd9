//! StateVector: fixed-dimension, always-finite numeric state

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A real-valued state vector. Every component is finite; construction
/// through [`StateVector::new`] (or deserialization) enforces it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct StateVector(Vec<f64>);

impl StateVector {
    pub fn new(components: Vec<f64>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::EmptyVector);
        }
        if let Some((index, value)) = components
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(Error::NonFinite {
                index,
                value: *value,
            });
        }
        Ok(Self(components))
    }

    pub fn zeros(dim: usize) -> Result<Self> {
        Self::new(vec![0.0; dim])
    }

    /// Canonical unit basis vector `e_axis`.
    pub fn unit(dim: usize, axis: usize) -> Result<Self> {
        if axis >= dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                got: axis + 1,
            });
        }
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        Self::new(v)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    pub fn norm(&self) -> f64 {
        self.0.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// Euclidean distance. `None` when dimensions differ.
    pub fn distance(&self, other: &StateVector) -> Option<f64> {
        if self.dim() != other.dim() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt(),
        )
    }

    /// Cosine similarity in [-1, 1]; 0.0 when either side has zero norm
    /// or the dimensions differ.
    pub fn cosine(&self, other: &StateVector) -> f64 {
        if self.dim() != other.dim() {
            return 0.0;
        }
        let denom = self.norm() * other.norm();
        if denom <= f64::EPSILON {
            return 0.0;
        }
        let dot: f64 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        (dot / denom).clamp(-1.0, 1.0)
    }

    /// Index of the component with the largest magnitude.
    pub fn dominant_axis(&self) -> usize {
        self.0
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |(best, best_abs), (i, v)| {
                if v.abs() > best_abs {
                    (i, v.abs())
                } else {
                    (best, best_abs)
                }
            })
            .0
    }

    /// `self + scale * other`, validated. Fails on dimension mismatch or
    /// if the result overflows to a non-finite value.
    pub fn add_scaled(&self, other: &StateVector, scale: f64) -> Result<StateVector> {
        if self.dim() != other.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                got: other.dim(),
            });
        }
        Self::new(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| a + scale * b)
                .collect(),
        )
    }

    pub fn ensure_dim(&self, expected: usize) -> Result<()> {
        if self.dim() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                got: self.dim(),
            });
        }
        Ok(())
    }
}

impl TryFrom<Vec<f64>> for StateVector {
    type Error = Error;

    fn try_from(v: Vec<f64>) -> Result<Self> {
        Self::new(v)
    }
}

impl From<StateVector> for Vec<f64> {
    fn from(v: StateVector) -> Self {
        v.0
    }
}

impl fmt::Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.4}", v)?;
        }
        write!(f, "]")
    }
}
