//! Stepweave Watcher: a decaying weighted hypergraph of symbolic tags
//!
//! Relations group two or more tags. Minimal (two-tag) relations start out
//! transient and decay every observe cycle unless they are promoted into
//! higher-order groupings; ghosts are speculative tags that earn their way
//! into relations by being seen in the observed signal.

pub mod context;
pub mod embedding;
pub mod ghost;
pub mod relation;
pub mod snapshot;
pub mod watcher;

pub use context::ContextWindow;
pub use embedding::{embed_tags, tag_vector};
pub use ghost::Ghost;
pub use relation::{member_signature, Member, RegisterFlags, Relation, RelationId};
pub use snapshot::{WatcherSnapshot, SNAPSHOT_VERSION};
pub use watcher::{ObserveReport, RelationWatcher};
