//! Notification Transport Port - Push Channel Interface
//!
//! Defines the traits the live feed client needs from a push transport.
//! A transport opens at most one session per `connect` call; the feed
//! client guarantees it keeps at most one session open at a time.

use async_trait::async_trait;

use crate::error::TransportError;

/// Factory for push sessions (WebSocket, in-process channel, ...).
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    /// Session type produced by a successful connect.
    type Session: FeedSession;

    /// Open a new session.
    ///
    /// # Errors
    /// Returns `TransportError` if the channel cannot be opened.
    async fn connect(&self) -> Result<Self::Session, TransportError>;

    /// Where this transport connects to, for logging.
    fn endpoint(&self) -> String;
}

/// One open push channel.
#[async_trait]
pub trait FeedSession: Send + 'static {
    /// Next text frame.
    ///
    /// `None` means the peer closed the session cleanly; `Some(Err(_))`
    /// is a transport failure. Both end the session. Must be cancel-safe:
    /// dropping the future before completion may not lose a text frame.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    /// Send a text frame to the server.
    async fn send_frame(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the session. Errors while closing are ignored.
    async fn close(&mut self);
}
