//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) the feed client and analytics engine
//! require from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `FeedTransport` / `FeedSession`: push notification channel
//! - `OutcomeStore`: recent-outcome persistence

pub mod outcome_store;
pub mod transport;

pub use outcome_store::OutcomeStore;
pub use transport::{FeedSession, FeedTransport};
