//! Stepweave Kernel: authoritative state, feasibility gate, adaptive tuning
//! and the tamper-evident tick journal.

pub mod adaptive;
pub mod feasibility;
pub mod journal;
pub mod kernel;

pub use adaptive::{AdaptiveParams, Feedback, FeedbackInput, ParamsSnapshot};
pub use feasibility::{difference, feasible, potential, presence, FeasibilityRules, KernelView};
pub use journal::{corrupted, IngestOutcome, Journal, JournalEntry, JournalStats, RejectReason};
pub use kernel::StateKernel;
