//! Component boundaries
//!
//! Each collaborating component declares the operations it owns. The agent
//! refuses to be built if its surface overlaps a collaborator's.

use crate::error::{Error, Result};

pub trait Component {
    const NAME: &'static str;
    /// Operation names reserved to this component.
    const OPERATIONS: &'static [&'static str];
}

/// Fails with `BoundaryViolation` if `A` and `B` share any operation name.
pub fn ensure_disjoint<A: Component, B: Component>() -> Result<()> {
    let shared: Vec<&str> = A::OPERATIONS
        .iter()
        .copied()
        .filter(|op| B::OPERATIONS.contains(op))
        .collect();
    if shared.is_empty() {
        return Ok(());
    }
    Err(Error::BoundaryViolation(format!(
        "{} implements operations reserved to {}: {}",
        A::NAME,
        B::NAME,
        shared.join(", ")
    )))
}
