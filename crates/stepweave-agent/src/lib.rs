//! Stepweave Agent: bounded path search over watcher relations
//!
//! Each cycle the agent combines relations into candidate paths, scores the
//! trial state each path would produce against a dry-run view of the kernel,
//! commits the winner and feeds the outcome back to every collaborator.

pub mod agent;
pub mod candidate;
pub mod checkpoint;
pub mod depth;
pub mod promotion;
pub mod scoring;
pub mod synergy;

pub use agent::{CycleReport, PathSearchAgent};
pub use candidate::{enumerate_paths, relation_weight, PathCandidate, PathRelation};
pub use checkpoint::{AgentCheckpoint, CHECKPOINT_VERSION};
pub use depth::{DepthChange, DepthController};
pub use promotion::{Promotion, PromotionTracker};
pub use scoring::{
    score_candidate, transient_penalty, trial_state, HarmonicBonus, ScoreInputs, ScoringTerm,
};
pub use synergy::SynergyMemory;
