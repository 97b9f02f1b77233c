//! In-process Notification Transport
//!
//! A `FeedTransport` backed by tokio channels, driven from the outside by a
//! `MemoryPublisher`. Used for local runs without a feed server and by the
//! test suite to script frames, transport failures and refused connects.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::TransportError;
use crate::ports::transport::{FeedSession, FeedTransport};

enum SessionEvent {
    Frame(String),
    Fail(TransportError),
    Close,
}

#[derive(Default)]
struct HubState {
    current: Option<mpsc::UnboundedSender<SessionEvent>>,
    refuse_connects: usize,
    sent: Vec<String>,
    connect_times: Vec<Instant>,
}

#[derive(Default)]
struct Hub {
    state: Mutex<HubState>,
}

/// Channel-backed transport. At most one session is live; a new connect
/// replaces (and ends) the previous one.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Hub>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for pushing frames into the live session.
    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            hub: Arc::clone(&self.hub),
        }
    }
}

#[async_trait]
impl FeedTransport for MemoryTransport {
    type Session = MemorySession;

    async fn connect(&self) -> Result<MemorySession, TransportError> {
        let mut state = self.hub.state.lock();
        state.connect_times.push(Instant::now());

        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.current = Some(tx.clone());
        debug!(connects = state.connect_times.len(), "Memory session opened");
        Ok(MemorySession {
            hub: Arc::clone(&self.hub),
            own: tx,
            events: rx,
        })
    }

    fn endpoint(&self) -> String {
        "memory://feed".to_string()
    }
}

/// Session end of the channel transport.
pub struct MemorySession {
    hub: Arc<Hub>,
    own: mpsc::UnboundedSender<SessionEvent>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

#[async_trait]
impl FeedSession for MemorySession {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        match self.events.recv().await? {
            SessionEvent::Frame(text) => Some(Ok(text)),
            SessionEvent::Fail(e) => Some(Err(e)),
            SessionEvent::Close => None,
        }
    }

    async fn send_frame(&mut self, frame: String) -> Result<(), TransportError> {
        let mut state = self.hub.state.lock();
        let live = state
            .current
            .as_ref()
            .is_some_and(|current| current.same_channel(&self.own));
        if !live {
            return Err(TransportError::Send("session replaced".into()));
        }
        state.sent.push(frame);
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.hub.state.lock();
        if state
            .current
            .as_ref()
            .is_some_and(|current| current.same_channel(&self.own))
        {
            state.current = None;
        }
        self.events.close();
    }
}

/// Server side of a `MemoryTransport`.
#[derive(Clone)]
pub struct MemoryPublisher {
    hub: Arc<Hub>,
}

impl MemoryPublisher {
    /// Deliver a text frame to the live session. Returns false if none is open.
    pub fn publish(&self, frame: impl Into<String>) -> bool {
        self.send(SessionEvent::Frame(frame.into()))
    }

    /// End the live session with a transport error.
    pub fn fail(&self, error: TransportError) -> bool {
        let sent = self.send(SessionEvent::Fail(error));
        self.hub.state.lock().current = None;
        sent
    }

    /// End the live session cleanly, as a server-side close.
    pub fn close(&self) -> bool {
        let sent = self.send(SessionEvent::Close);
        self.hub.state.lock().current = None;
        sent
    }

    /// Refuse the next `count` connect attempts.
    pub fn refuse_next_connects(&self, count: usize) {
        self.hub.state.lock().refuse_connects = count;
    }

    pub fn is_connected(&self) -> bool {
        self.hub
            .state
            .lock()
            .current
            .as_ref()
            .is_some_and(|current| !current.is_closed())
    }

    /// Control frames the client has sent, in order.
    pub fn sent_frames(&self) -> Vec<String> {
        self.hub.state.lock().sent.clone()
    }

    /// Number of connect attempts, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.hub.state.lock().connect_times.len()
    }

    /// When each connect attempt happened.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.hub.state.lock().connect_times.clone()
    }

    fn send(&self, event: SessionEvent) -> bool {
        self.hub
            .state
            .lock()
            .current
            .as_ref()
            .is_some_and(|current| current.send(event).is_ok())
    }
}
