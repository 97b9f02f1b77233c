//! Error taxonomy for the feed and analytics boundaries.
//!
//! None of these ever escape the component that detects them:
//! transport errors drive the reconnect loop, malformed messages are
//! dropped at dispatch, fetch errors are recorded on the stream's
//! analytics view, listener errors are logged and isolated.

use thiserror::Error;

/// Longest excerpt of a bad frame kept for logging.
const EXCERPT_LEN: usize = 120;

/// Connection-level failure of the notification transport.
///
/// Always retried with backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("failed to send frame: {0}")]
    Send(String),

    #[error("connection closed by peer")]
    Closed,
}

/// A frame that could not be turned into a feed event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed feed message ({reason}): {excerpt}")]
pub struct MalformedMessage {
    pub reason: String,
    pub excerpt: String,
}

impl MalformedMessage {
    pub fn new(reason: impl Into<String>, raw: &str) -> Self {
        let excerpt = match raw.char_indices().nth(EXCERPT_LEN) {
            Some((idx, _)) => format!("{}…", &raw[..idx]),
            None => raw.to_string(),
        };
        Self {
            reason: reason.into(),
            excerpt,
        }
    }
}

/// Failure of the persistence collaborator.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("outcome store unavailable: {0}")]
    Unavailable(String),

    #[error("outcome store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode outcome record: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A listener panicked while handling an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("listener for topic {topic} panicked: {message}")]
pub struct ListenerError {
    pub topic: String,
    pub message: String,
}

impl ListenerError {
    /// Build from a `catch_unwind` payload.
    pub fn from_panic(topic: impl Into<String>, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self {
            topic: topic.into(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_excerpt_truncated() {
        let raw = "x".repeat(500);
        let err = MalformedMessage::new("bad", &raw);
        assert!(err.excerpt.chars().count() <= EXCERPT_LEN + 1);
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_listener_error_from_panic_payload() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        let err = ListenerError::from_panic("StreamA", payload.as_ref());
        assert_eq!(err.message, "boom");
        assert_eq!(err.topic, "StreamA");
    }
}
