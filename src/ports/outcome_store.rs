//! Outcome Store Port - Persistence Collaborator Interface
//!
//! The analytics engine only ever asks for "the latest K outcomes of a
//! stream"; ingestion only ever appends. Results are all-or-nothing:
//! a store never returns a partial window.

use async_trait::async_trait;

use crate::domain::outcome::Outcome;
use crate::error::FetchError;

/// Trait for outcome persistence providers.
#[async_trait]
pub trait OutcomeStore: Send + Sync + 'static {
    /// Latest `limit` outcomes of `stream_id`, most recent first.
    ///
    /// An unknown stream yields an empty list, not an error.
    ///
    /// # Errors
    /// Returns `FetchError` if the store cannot be read.
    async fn fetch_recent(&self, stream_id: &str, limit: usize) -> Result<Vec<Outcome>, FetchError>;

    /// Append a new outcome to its stream.
    ///
    /// # Errors
    /// Returns `FetchError` if the store cannot be written.
    async fn append(&self, outcome: &Outcome) -> Result<(), FetchError>;

    /// Check if the store is usable.
    async fn is_healthy(&self) -> bool;
}
