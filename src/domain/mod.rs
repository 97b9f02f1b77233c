//! Domain layer - Outcomes, windows and derived statistics.
//!
//! Pure types and functions: no I/O, no async, no clocks except the
//! `computed_at` stamp on snapshots. Everything here is testable in
//! isolation and shared by the feed client and the analytics engine.

pub mod analytics;
pub mod backoff;
pub mod error;
pub mod event;
pub mod outcome;
pub mod window;

pub use analytics::{
    AlertLevel, AnalyticsSnapshot, ColorShare, CurrentStreak, MissingDozen, NumberFrequency,
    StreakLabel, compute_snapshot,
};
pub use backoff::ReconnectBackoff;
pub use error::DomainError;
pub use event::{ControlMessage, FeedEvent};
pub use outcome::{Color, Dozen, Outcome, Parity, StreamId};
pub use window::OutcomeWindow;
