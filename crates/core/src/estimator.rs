//! Token estimator trait.
//!
//! Estimation is a pure function over context entries — no side effects,
//! safe to call as often as needed. Implementations live with the session
//! engine; the trait lives here so it can be injected like every other
//! collaborator.

use crate::entry::ContextEntry;

/// Estimates how many tokens a set of context entries will cost.
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count for the given entries.
    fn estimate(&self, entries: &[ContextEntry]) -> usize;
}
