//! Stepweave Core - shared types, configuration, errors and collaborator traits

pub mod boundary;
pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod tick;
pub mod vector;

pub use boundary::{ensure_disjoint, Component};
pub use config::*;
pub use error::{Error, Result};
pub use memory::{MemoryProvider, WeightedTagCache};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use tick::{sha256_hex, tick_auth_tag, Tick};
pub use vector::StateVector;
