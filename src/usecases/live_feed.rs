//! Live Feed Client - Resilient Push Subscription
//!
//! Keeps one logical subscription to the notification transport and
//! fans incoming outcomes out to per-topic listener sets:
//! 1. `subscribe` registers a listener and starts the connection lifecycle
//! 2. The lifecycle connects, streams frames, and on any transport error
//!    waits out a capped exponential backoff before reconnecting
//! 3. Each valid `new_outcome` frame is dispatched synchronously to the
//!    stream's listeners, then to the wildcard listeners, in registration
//!    order, each isolated from the others' panics
//!
//! Nothing here returns an error to callers: consumers observe
//! `ConnectionState` through `connection_state()` / `watch_state()`.
//!
//! Every lifecycle run carries an epoch. `disconnect()` bumps it, so a
//! connect, frame or state change still in flight from the old run is
//! discarded instead of applied.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::backoff::ReconnectBackoff;
use crate::domain::event::{ControlMessage, FeedEvent};
use crate::domain::outcome::{Outcome, StreamId};
use crate::error::{ListenerError, TransportError};
use crate::ports::transport::{FeedSession, FeedTransport};

/// Callback invoked for every outcome on a subscribed topic.
///
/// Identity is the `Arc` pointer: subscribing the same `Arc` twice to one
/// topic is a no-op, and `unsubscribe` needs that same `Arc`.
pub type Listener = Arc<dyn Fn(&Outcome) + Send + Sync>;

/// What a listener is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every stream (`"*"`).
    All,
    /// One stream.
    Stream(StreamId),
}

impl Topic {
    pub const WILDCARD: &'static str = "*";
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        if value == Self::WILDCARD {
            Self::All
        } else {
            Self::Stream(value.to_string())
        }
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        if value == Self::WILDCARD {
            Self::All
        } else {
            Self::Stream(value)
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str(Self::WILDCARD),
            Self::Stream(id) => f.write_str(id),
        }
    }
}

// ────────────────────────────────────────────
// Connection state
// ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Process-wide connection state, mutated only by the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Consecutive failed attempts since the last successful connect.
    pub attempt: u32,
    /// Delay scheduled (or to be used) before the next reconnect.
    pub backoff: Duration,
}

impl ConnectionState {
    fn reset(status: ConnectionStatus, backoff: &ReconnectBackoff) -> Self {
        Self {
            status,
            attempt: 0,
            backoff: backoff.base(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Running counters, readable without locking.
#[derive(Debug, Default)]
struct FeedStats {
    events_dispatched: AtomicU64,
    malformed_messages: AtomicU64,
    listener_failures: AtomicU64,
    transport_errors: AtomicU64,
}

/// Point-in-time copy of the feed counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStatsSnapshot {
    pub events_dispatched: u64,
    pub malformed_messages: u64,
    pub listener_failures: u64,
    pub transport_errors: u64,
}

// ────────────────────────────────────────────
// Listener registry
// ────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Registration {
    NewTopic,
    Added,
    Duplicate,
}

#[derive(Default)]
struct ListenerRegistry {
    topics: HashMap<Topic, Vec<Listener>>,
}

impl ListenerRegistry {
    fn add(&mut self, topic: Topic, listener: Listener) -> Registration {
        match self.topics.get_mut(&topic) {
            Some(listeners) if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) => {
                Registration::Duplicate
            }
            Some(listeners) => {
                listeners.push(listener);
                Registration::Added
            }
            None => {
                self.topics.insert(topic, vec![listener]);
                Registration::NewTopic
            }
        }
    }

    /// Remove a listener. Returns true if the topic became empty and was dropped.
    fn remove(&mut self, topic: &Topic, listener: &Listener) -> bool {
        let Some(listeners) = self.topics.get_mut(topic) else {
            return false;
        };
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        if listeners.is_empty() {
            self.topics.remove(topic);
            true
        } else {
            false
        }
    }

    /// Stream listeners first, then wildcard listeners, each in registration order.
    fn listeners_for(&self, stream_id: &str) -> Vec<(Topic, Listener)> {
        let stream_topic = Topic::Stream(stream_id.to_string());
        [stream_topic, Topic::All]
            .into_iter()
            .filter_map(|topic| {
                let listeners = self.topics.get(&topic)?;
                Some(
                    listeners
                        .iter()
                        .map(|l| (topic.clone(), Arc::clone(l)))
                        .collect::<Vec<_>>(),
                )
            })
            .flatten()
            .collect()
    }

    fn stream_topics(&self) -> Vec<StreamId> {
        self.topics
            .keys()
            .filter_map(|topic| match topic {
                Topic::Stream(id) => Some(id.clone()),
                Topic::All => None,
            })
            .collect()
    }

    fn listener_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }
}

// ────────────────────────────────────────────
// Client
// ────────────────────────────────────────────

#[derive(Default)]
struct Lifecycle {
    epoch: u64,
    task: Option<JoinHandle<()>>,
    commands: Option<mpsc::UnboundedSender<ControlMessage>>,
}

struct Shared<T: FeedTransport> {
    transport: T,
    backoff: ReconnectBackoff,
    registry: Mutex<ListenerRegistry>,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<ConnectionState>,
    wake: Notify,
    stats: FeedStats,
}

/// Shared live feed client.
///
/// Cheap to clone; all clones drive the same connection. Construct one per
/// process at the composition root and call [`LiveFeedClient::disconnect`]
/// to dispose of it.
pub struct LiveFeedClient<T: FeedTransport> {
    shared: Arc<Shared<T>>,
}

impl<T: FeedTransport> Clone for LiveFeedClient<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: FeedTransport> LiveFeedClient<T> {
    /// Create a disconnected client. Nothing connects until the first subscribe.
    pub fn new(transport: T, backoff: ReconnectBackoff) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::reset(
            ConnectionStatus::Disconnected,
            &backoff,
        ));
        Self {
            shared: Arc::new(Shared {
                transport,
                backoff,
                registry: Mutex::new(ListenerRegistry::default()),
                lifecycle: Mutex::new(Lifecycle::default()),
                state_tx,
                wake: Notify::new(),
                stats: FeedStats::default(),
            }),
        }
    }

    /// Register `listener` under `topic` and make sure a connection is underway.
    ///
    /// Registering the same listener twice on one topic is a no-op.
    pub fn subscribe(&self, topic: impl Into<Topic>, listener: Listener) {
        let topic = topic.into();
        let (registration, count) = {
            let mut registry = self.shared.registry.lock();
            let registration = registry.add(topic.clone(), listener);
            (registration, registry.listener_count(&topic))
        };

        match registration {
            Registration::Duplicate => {
                debug!(topic = %topic, "Listener already subscribed");
            }
            Registration::NewTopic => {
                if let Topic::Stream(stream_id) = &topic {
                    self.shared.send_command(ControlMessage::Subscribe {
                        stream_id: stream_id.clone(),
                    });
                }
                info!(topic = %topic, listeners = count, "Subscribed to new topic");
            }
            Registration::Added => {
                debug!(topic = %topic, listeners = count, "Listener added");
            }
        }

        self.ensure_connected();
    }

    /// Remove `listener` from `topic`. The connection stays open.
    pub fn unsubscribe(&self, topic: impl Into<Topic>, listener: &Listener) {
        let topic = topic.into();
        let dropped = self.shared.registry.lock().remove(&topic, listener);
        if dropped {
            if let Topic::Stream(stream_id) = &topic {
                self.shared.send_command(ControlMessage::Unsubscribe {
                    stream_id: stream_id.clone(),
                });
            }
            info!(topic = %topic, "Topic dropped, no listeners left");
        }
    }

    /// Start the connection lifecycle if it is not running.
    ///
    /// While the lifecycle is waiting out a backoff delay this wakes it to
    /// reconnect now. Without a tokio runtime the connect is deferred.
    pub fn ensure_connected(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();

        if lifecycle.task.as_ref().is_some_and(|task| !task.is_finished()) {
            if self.shared.state_tx.borrow().status == ConnectionStatus::Disconnected {
                self.shared.wake.notify_waiters();
            }
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime available, live feed connection deferred");
            return;
        };

        lifecycle.epoch += 1;
        let epoch = lifecycle.epoch;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        lifecycle.commands = Some(command_tx);
        lifecycle.task = Some(runtime.spawn(run_lifecycle(
            Arc::clone(&self.shared),
            epoch,
            command_rx,
        )));
    }

    /// Tear down the connection and cancel any pending reconnect.
    ///
    /// Listeners stay registered; the next `subscribe` reconnects.
    pub fn disconnect(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();
        lifecycle.epoch += 1;
        lifecycle.commands = None;
        if let Some(task) = lifecycle.task.take() {
            task.abort();
        }
        self.shared.state_tx.send_replace(ConnectionState::reset(
            ConnectionStatus::Disconnected,
            &self.shared.backoff,
        ));
        info!(endpoint = %self.shared.transport.endpoint(), "Live feed disconnected");
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Receiver that observes every connection state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    pub fn stats(&self) -> FeedStatsSnapshot {
        let stats = &self.shared.stats;
        FeedStatsSnapshot {
            events_dispatched: stats.events_dispatched.load(Ordering::Relaxed),
            malformed_messages: stats.malformed_messages.load(Ordering::Relaxed),
            listener_failures: stats.listener_failures.load(Ordering::Relaxed),
            transport_errors: stats.transport_errors.load(Ordering::Relaxed),
        }
    }

    /// Number of listeners registered under `topic`.
    pub fn listener_count(&self, topic: impl Into<Topic>) -> usize {
        self.shared.registry.lock().listener_count(&topic.into())
    }
}

impl<T: FeedTransport> Shared<T> {
    /// Apply a state change if `epoch` is still the live run.
    fn transition(&self, epoch: u64, change: impl FnOnce(&mut ConnectionState)) -> bool {
        let lifecycle = self.lifecycle.lock();
        if lifecycle.epoch != epoch {
            return false;
        }
        self.state_tx.send_modify(change);
        true
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lifecycle.lock().epoch == epoch
    }

    fn send_command(&self, command: ControlMessage) {
        if let Some(commands) = &self.lifecycle.lock().commands {
            let _ = commands.send(command);
        }
    }

    /// Stream one open session until it fails or the client is disconnected.
    ///
    /// `Ok(())` means the command channel closed (client disposed).
    async fn stream_session(
        &self,
        epoch: u64,
        session: &mut T::Session,
        commands: &mut mpsc::UnboundedReceiver<ControlMessage>,
    ) -> Result<(), TransportError> {
        // Topics registered while offline are covered by the full resend below.
        while commands.try_recv().is_ok() {}

        let topics = self.registry.lock().stream_topics();
        for stream_id in topics {
            session
                .send_frame(ControlMessage::Subscribe { stream_id }.to_frame())
                .await?;
        }

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(message) => session.send_frame(message.to_frame()).await?,
                    None => return Ok(()),
                },
                frame = session.next_frame() => match frame {
                    Some(Ok(text)) => {
                        if !self.is_current(epoch) {
                            return Ok(());
                        }
                        self.handle_frame(epoch, &text);
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(TransportError::Closed),
                },
            }
        }
    }

    fn handle_frame(&self, epoch: u64, text: &str) {
        match FeedEvent::parse(text) {
            FeedEvent::NewOutcome(outcome) => self.dispatch(&outcome),
            FeedEvent::RecentHistory(outcomes) => {
                debug!(count = outcomes.len(), "Replaying recent history");
                for (i, outcome) in outcomes.iter().enumerate() {
                    // A listener may disconnect the client mid-batch.
                    if !self.is_current(epoch) {
                        debug!(dropped = outcomes.len() - i, "Client disconnected, dropping rest of history");
                        return;
                    }
                    self.dispatch(outcome);
                }
            }
            FeedEvent::Connected { message } => {
                info!(message = message.as_deref().unwrap_or_default(), "Feed server greeting");
            }
            FeedEvent::Malformed(err) => {
                self.stats.malformed_messages.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "Dropping malformed feed message");
            }
        }
    }

    fn dispatch(&self, outcome: &Outcome) {
        let listeners = self.registry.lock().listeners_for(outcome.stream_id());

        debug!(
            stream = outcome.stream_id(),
            value = outcome.value(),
            color = %outcome.color(),
            listeners = listeners.len(),
            "Dispatching outcome"
        );

        for (topic, listener) in listeners {
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| listener(outcome))) {
                let err = ListenerError::from_panic(topic.to_string(), payload.as_ref());
                self.stats.listener_failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, stream = outcome.stream_id(), "Listener failed, continuing dispatch");
            }
        }

        self.stats.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }
}

/// Connection lifecycle: connect, stream, back off, repeat.
#[instrument(skip_all, fields(endpoint = %shared.transport.endpoint(), epoch = epoch))]
async fn run_lifecycle<T: FeedTransport>(
    shared: Arc<Shared<T>>,
    epoch: u64,
    mut commands: mpsc::UnboundedReceiver<ControlMessage>,
) {
    let mut attempt: u32 = 0;

    loop {
        if !shared.transition(epoch, |s| s.status = ConnectionStatus::Connecting) {
            return;
        }
        debug!(attempt, "Connecting to live feed");

        let error = match shared.transport.connect().await {
            Ok(mut session) => {
                let connected = shared.transition(epoch, |s| {
                    *s = ConnectionState::reset(ConnectionStatus::Connected, &shared.backoff);
                });
                if !connected {
                    session.close().await;
                    return;
                }
                attempt = 0;
                info!("Live feed connected");

                let result = shared.stream_session(epoch, &mut session, &mut commands).await;
                session.close().await;
                match result {
                    Ok(()) => {
                        info!("Live feed lifecycle stopped");
                        return;
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        attempt = attempt.saturating_add(1);
        let delay = shared.backoff.delay(attempt);
        let scheduled = shared.transition(epoch, |s| {
            s.status = ConnectionStatus::Disconnected;
            s.attempt = attempt;
            s.backoff = delay;
        });
        if !scheduled {
            return;
        }
        shared.stats.transport_errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            error = %error,
            attempt,
            delay_ms = delay.as_millis(),
            "Live feed transport error, reconnect scheduled"
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shared.wake.notified() => {
                debug!(attempt, "Reconnect requested by subscriber");
            }
        }
    }
}
