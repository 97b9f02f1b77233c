//! In-memory Outcome Store
//!
//! Keeps a bounded, most-recent-first history per stream. Nothing
//! survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::error::DomainError;
use crate::domain::outcome::{Outcome, StreamId};
use crate::domain::window::OutcomeWindow;
use crate::error::FetchError;
use crate::ports::outcome_store::OutcomeStore;

/// Default number of outcomes retained per stream.
pub const DEFAULT_RETENTION: usize = 500;

pub struct MemoryOutcomeStore {
    retention: usize,
    streams: RwLock<HashMap<StreamId, OutcomeWindow>>,
}

impl Default for MemoryOutcomeStore {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            streams: RwLock::new(HashMap::new()),
        }
    }
}

impl MemoryOutcomeStore {
    /// Store keeping at most `retention` outcomes per stream.
    ///
    /// # Errors
    /// Returns `DomainError::ZeroCapacity` if `retention == 0`.
    pub fn with_retention(retention: usize) -> Result<Self, DomainError> {
        if retention == 0 {
            return Err(DomainError::ZeroCapacity);
        }
        Ok(Self {
            retention,
            streams: RwLock::new(HashMap::new()),
        })
    }

    /// Number of outcomes held for `stream_id`.
    pub fn len(&self, stream_id: &str) -> usize {
        self.streams.read().get(stream_id).map_or(0, OutcomeWindow::len)
    }
}

#[async_trait]
impl OutcomeStore for MemoryOutcomeStore {
    async fn fetch_recent(&self, stream_id: &str, limit: usize) -> Result<Vec<Outcome>, FetchError> {
        Ok(self
            .streams
            .read()
            .get(stream_id)
            .map(|history| history.recent(limit))
            .unwrap_or_default())
    }

    async fn append(&self, outcome: &Outcome) -> Result<(), FetchError> {
        let mut streams = self.streams.write();
        let history = match streams.get_mut(outcome.stream_id()) {
            Some(history) => history,
            None => {
                let window = OutcomeWindow::new(self.retention)
                    .map_err(|e| FetchError::Unavailable(e.to_string()))?;
                streams.entry(outcome.stream_id().to_string()).or_insert(window)
            }
        };
        history.push(outcome.clone());
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn test_retention_evicts_oldest() {
        let store = MemoryOutcomeStore::with_retention(3).unwrap();
        for value in 1..=5u8 {
            tokio_test::assert_ok!(
                store
                    .append(&Outcome::new("A", value, Utc::now()).unwrap())
                    .await
            );
        }

        assert_eq!(store.len("A"), 3);
        let values: Vec<u8> = store
            .fetch_recent("A", 10)
            .await
            .unwrap()
            .iter()
            .map(Outcome::value)
            .collect();
        assert_eq!(values, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn test_unknown_stream_is_empty() {
        let store = MemoryOutcomeStore::default();
        assert!(store.fetch_recent("nope", 10).await.unwrap().is_empty());
        assert!(MemoryOutcomeStore::with_retention(0).is_err());
    }
}
