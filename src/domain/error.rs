//! Domain validation errors.
//!
//! Returned by constructors that enforce domain invariants
//! (wheel value range, window capacity).

use thiserror::Error;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Wheel values live in `0..=36`.
    #[error("outcome value must be in 0..=36, got {value}")]
    ValueOutOfRange {
        /// The rejected value, as received.
        value: i64,
    },

    /// A window must be able to hold at least one outcome.
    #[error("window capacity must be at least 1")]
    ZeroCapacity,
}
