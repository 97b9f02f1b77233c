//! Bounded, most-recent-first outcome window.
//!
//! The window is the only input of the analytics derivations. It never
//! holds more than `capacity` outcomes; pushing into a full window evicts
//! the oldest entry.

use std::collections::VecDeque;

use serde::{Serialize, Serializer};

use super::error::DomainError;
use super::outcome::Outcome;

/// Ordered outcome window, index 0 is the most recent outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeWindow {
    entries: VecDeque<Outcome>,
    capacity: usize,
}

impl OutcomeWindow {
    /// Create an empty window. Storage grows with the entries, not the capacity.
    ///
    /// # Errors
    /// Returns `DomainError::ZeroCapacity` if `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, DomainError> {
        if capacity == 0 {
            return Err(DomainError::ZeroCapacity);
        }
        Ok(Self {
            entries: VecDeque::new(),
            capacity,
        })
    }

    /// Build a window from outcomes already ordered most-recent-first.
    ///
    /// Anything past `capacity` is dropped (the oldest entries).
    pub fn from_recent(
        outcomes: impl IntoIterator<Item = Outcome>,
        capacity: usize,
    ) -> Result<Self, DomainError> {
        let mut window = Self::new(capacity)?;
        window.entries.extend(outcomes.into_iter().take(capacity));
        Ok(window)
    }

    /// Insert the newest outcome, evicting the oldest when full.
    ///
    /// Returns the evicted outcome, if any.
    pub fn push(&mut self, outcome: Outcome) -> Option<Outcome> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_back()
        } else {
            None
        };
        self.entries.push_front(outcome);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Most recent outcome.
    pub fn latest(&self) -> Option<&Outcome> {
        self.entries.front()
    }

    /// Iterate from the most recent outcome backward.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Outcome> + ExactSizeIterator + '_ {
        self.entries.iter()
    }

    /// Copy of the first `limit` outcomes, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<Outcome> {
        self.entries.iter().take(limit).cloned().collect()
    }
}

impl Serialize for OutcomeWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}
