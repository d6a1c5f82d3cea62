//! Event-sourced aggregate contracts.
//!
//! An aggregate decides (`handle`) and evolves (`apply`); loading history,
//! persisting events and publishing them live behind infrastructure seams.
//! The contract stays this small so each domain crate can model its own
//! state machine, from a job card's two-state lifecycle to a stock counter.

use crate::error::{DomainError, DomainResult};

/// Identity and versioning surface of an aggregate.
pub trait AggregateRoot {
    /// Strongly-typed identifier (a job-card id, a spare-part id, ...).
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// The aggregate's identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events applied so far. Doubles as the stream revision the
    /// optimistic append checks against.
    fn version(&self) -> u64;
}

/// Aggregate execution semantics (pure, deterministic).
///
/// `handle` inspects state and returns the events a command produces; it
/// must not mutate. `apply` folds one event into state and must stay
/// deterministic, tracking `version()` as +1 per applied event. No IO in
/// either: effects belong to the dispatcher.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// Optimistic concurrency expectation for an append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip the check (idempotent commands, migrations).
    Any,
    /// The stream must be at exactly this revision.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_expectation_rejects_stale_revisions() {
        assert!(ExpectedVersion::Exact(3).check(3).is_ok());
        assert!(ExpectedVersion::Exact(3).check(4).is_err());
        assert!(ExpectedVersion::Any.check(17).is_ok());
    }
}
