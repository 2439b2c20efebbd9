//! Error types for Stepweave

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("non-finite component at index {index}: {value}")]
    NonFinite { index: usize, value: f64 },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("state vector must have at least one component")]
    EmptyVector,

    #[error("parameter {name} out of range: {value} (allowed {min}..={max})")]
    ParamOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid relation: {0}")]
    InvalidRelation(String),

    #[error("unknown relation: {0}")]
    UnknownRelation(u64),

    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("sequence {got} rejected: last accepted {last}")]
    SequenceRejected { got: u64, last: u64 },

    #[error("unsupported snapshot version {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },

    #[error("boundary violation: {0}")]
    BoundaryViolation(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_relation(reason: impl Into<String>) -> Self {
        Self::InvalidRelation(reason.into())
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigError(reason.into())
    }

    pub fn param_out_of_range(name: &'static str, value: f64, min: f64, max: f64) -> Self {
        Self::ParamOutOfRange {
            name,
            value,
            min,
            max,
        }
    }

    /// True for errors caused by caller input rather than internal faults.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NonFinite { .. }
                | Self::DimensionMismatch { .. }
                | Self::EmptyVector
                | Self::ParamOutOfRange { .. }
                | Self::InvalidRelation(_)
        )
    }
}
