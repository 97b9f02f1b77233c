//! Live feed wire messages.
//!
//! Incoming frames are JSON objects tagged by `type`. Parsing is total:
//! every frame becomes exactly one [`FeedEvent`], and anything that is
//! not a recognised, well-formed message becomes `FeedEvent::Malformed`
//! so the dispatcher can drop it with one exhaustive match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outcome::{Outcome, StreamId};
use crate::error::MalformedMessage;

/// A parsed incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A new outcome for one stream.
    NewOutcome(Outcome),
    /// A batch of past outcomes, oldest first.
    RecentHistory(Vec<Outcome>),
    /// Server greeting after the transport opened.
    Connected { message: Option<String> },
    /// Unrecognised or invalid frame.
    Malformed(MalformedMessage),
}

impl FeedEvent {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Self {
        let wire: WireMessage = match serde_json::from_str(text) {
            Ok(wire) => wire,
            Err(e) => return Self::Malformed(MalformedMessage::new(e.to_string(), text)),
        };

        match wire {
            WireMessage::NewOutcome(body) => match body.into_outcome() {
                Ok(outcome) => Self::NewOutcome(outcome),
                Err(reason) => Self::Malformed(MalformedMessage::new(reason, text)),
            },
            WireMessage::RecentHistory { outcomes } => {
                let parsed: Result<Vec<Outcome>, String> =
                    outcomes.into_iter().map(OutcomeBody::into_outcome).collect();
                match parsed {
                    Ok(mut outcomes) => {
                        outcomes.sort_by_key(Outcome::occurred_at);
                        Self::RecentHistory(outcomes)
                    }
                    Err(reason) => Self::Malformed(MalformedMessage::new(reason, text)),
                }
            }
            WireMessage::Connected { message } => Self::Connected { message },
        }
    }
}

/// Tagged wire representation of incoming frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    #[serde(alias = "new_number")]
    NewOutcome(OutcomeBody),
    RecentHistory {
        outcomes: Vec<OutcomeBody>,
    },
    Connected {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Body of a `new_outcome` frame. Accepts the scraper's field names too.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeBody {
    #[serde(alias = "roleta_nome")]
    stream_id: StreamId,
    #[serde(alias = "numero")]
    value: i64,
    #[serde(alias = "timestamp", default = "Utc::now")]
    occurred_at: DateTime<Utc>,
}

impl OutcomeBody {
    fn into_outcome(self) -> Result<Outcome, String> {
        if self.stream_id.is_empty() {
            return Err("empty stream id".to_string());
        }
        Outcome::from_wire(self.stream_id, self.value, self.occurred_at).map_err(|e| e.to_string())
    }
}

/// Frames the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Subscribe {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
    },
    Unsubscribe {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
    },
}

impl ControlMessage {
    /// JSON text frame for this message.
    pub fn to_frame(&self) -> String {
        // Serializing a tagged enum of strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
