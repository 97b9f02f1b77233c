//! JSONL Outcome Store - Append-only Per-Stream Files
//!
//! Persists outcomes to `outcomes/<stream>.jsonl`, one JSON record per
//! line, appended in arrival order. Reads scan the stream's file and
//! return the tail, newest first.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::domain::outcome::Outcome;
use crate::error::FetchError;
use crate::ports::outcome_store::OutcomeStore;

/// Append-only JSONL outcome store.
pub struct JsonlOutcomeStore {
    /// Directory holding one file per stream.
    outcomes_dir: PathBuf,
    /// Held by appends and reads, so lines never interleave and a read
    /// never sees a half-written line.
    file_lock: Mutex<()>,
}

impl JsonlOutcomeStore {
    /// Open (and create if needed) `<data_dir>/outcomes`.
    pub async fn new(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let outcomes_dir = data_dir.as_ref().join("outcomes");
        fs::create_dir_all(&outcomes_dir)
            .await
            .context("Failed to create outcomes directory")?;

        Ok(Self {
            outcomes_dir,
            file_lock: Mutex::new(()),
        })
    }

    fn stream_path(&self, stream_id: &str) -> PathBuf {
        self.outcomes_dir
            .join(format!("{}.jsonl", sanitize_stream_id(stream_id)))
    }
}

/// File-name-safe form of a stream id.
fn sanitize_stream_id(stream_id: &str) -> String {
    let name: String = stream_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() { "_".to_string() } else { name }
}

#[async_trait]
impl OutcomeStore for JsonlOutcomeStore {
    #[instrument(skip(self))]
    async fn fetch_recent(&self, stream_id: &str, limit: usize) -> Result<Vec<Outcome>, FetchError> {
        let path = self.stream_path(stream_id);
        let read = {
            let _guard = self.file_lock.lock().await;
            fs::read_to_string(&path).await
        };
        let content = match read {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut outcomes = Vec::new();
        for line in content.lines().rev() {
            if outcomes.len() == limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Outcome>(line) {
                // Sanitised names can collide; keep only this stream's records.
                Ok(outcome) if outcome.stream_id() == stream_id => outcomes.push(outcome),
                Ok(_) => {}
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping malformed outcome record");
                }
            }
        }

        debug!(count = outcomes.len(), "Loaded recent outcomes");
        Ok(outcomes)
    }

    #[instrument(skip(self, outcome), fields(stream = outcome.stream_id(), value = outcome.value()))]
    async fn append(&self, outcome: &Outcome) -> Result<(), FetchError> {
        let mut json = serde_json::to_string(outcome)?;
        json.push('\n');

        let _guard = self.file_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.stream_path(outcome.stream_id()))
            .await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let marker = self.outcomes_dir.join(".health_check");
        let result = fs::write(&marker, b"ok").await;
        let _ = fs::remove_file(&marker).await;
        result.is_ok()
    }
}
