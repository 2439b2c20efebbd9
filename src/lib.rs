//! Stepweave: closed-loop stepwise state evolution
//!
//! Wires the kernel, a relation watcher and the path-search agent together
//! from one configuration, and loads tick and relation-seed input files for
//! the `stepweave` binary.

pub mod engine;
pub mod input;

pub use engine::{initial_vector, Engine, EngineSummary, IngestSummary};
pub use input::{load_relation_seeds, load_ticks, RelationSeed};

pub use stepweave_agent as agent;
pub use stepweave_core as core;
pub use stepweave_kernel as kernel;
pub use stepweave_watcher as watcher;
