//! Analytics Engine - Per-Stream Snapshot Maintenance
//!
//! For every attached stream the engine owns one snapshot and keeps it
//! fresh through two independent triggers:
//! - a periodic timer (`refresh_interval`)
//! - a live feed listener on the stream's topic
//!
//! Both triggers call the same refresh pass: fetch the latest window from
//! the outcome store, recompute everything, replace the snapshot. Passes are
//! not ordered against each other; the last one to finish wins, which is
//! safe because each pass reads the full window.
//!
//! Every attachment has a generation number. A pass whose stream was
//! detached (or re-attached) while it was fetching is discarded. Passes are
//! also numbered when they start fetching; a pass that started before the
//! one already applied is dropped, so a slow fetch can never put an older
//! window back.
//!
//! When this process is also the ingester, [`AnalyticsEngine::ingest`]
//! writes an outcome and only then refreshes its stream, and
//! [`AnalyticsEngine::record_feed`] routes every feed outcome through it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::domain::analytics::{AnalyticsSnapshot, compute_snapshot};
use crate::domain::error::DomainError;
use crate::domain::outcome::{Outcome, StreamId};
use crate::domain::window::OutcomeWindow;
use crate::error::FetchError;
use crate::ports::outcome_store::OutcomeStore;
use crate::ports::transport::FeedTransport;
use crate::usecases::live_feed::{Listener, LiveFeedClient, Topic};

/// Shortest timer period accepted; tokio intervals reject zero.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

/// Per-attachment settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachOptions {
    /// Window capacity W (latest outcomes fetched per pass).
    pub window_capacity: usize,
    /// Period of the timer-driven refresh.
    pub refresh_interval: Duration,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            window_capacity: 100,
            refresh_interval: Duration::from_secs(15),
        }
    }
}

/// What a consumer sees for an attached stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsView {
    /// Attached, first pass still running.
    Loading,
    /// No pass has succeeded yet.
    Failed { error: String },
    /// Latest snapshot. `error` is set when the most recent pass failed
    /// and the snapshot is stale.
    Ready {
        snapshot: Arc<AnalyticsSnapshot>,
        error: Option<String>,
    },
}

impl AnalyticsView {
    pub fn snapshot(&self) -> Option<&AnalyticsSnapshot> {
        match self {
            Self::Ready { snapshot, .. } => Some(snapshot),
            Self::Loading | Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            Self::Ready { error, .. } => error.as_deref(),
            Self::Loading => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Proof of one `attach` call. Pass it back to `detach`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle leaves the stream attached"]
pub struct AnalyticsHandle {
    stream_id: StreamId,
    generation: u64,
}

impl AnalyticsHandle {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

/// Refresh pass counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub succeeded: u64,
    pub failed: u64,
}

struct StreamEntry {
    generation: u64,
    /// Number of the last pass applied to `view`.
    applied_pass: u64,
    refs: usize,
    options: AttachOptions,
    view: AnalyticsView,
    listener: Listener,
    tasks: [JoinHandle<()>; 2],
}

struct EngineInner<S: OutcomeStore + ?Sized, T: FeedTransport> {
    store: Arc<S>,
    feed: LiveFeedClient<T>,
    streams: Mutex<HashMap<StreamId, StreamEntry>>,
    next_generation: AtomicU64,
    next_pass: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Owns the analytics snapshots of every attached stream.
///
/// Cheap to clone; clones share the same streams.
pub struct AnalyticsEngine<S: OutcomeStore + ?Sized, T: FeedTransport> {
    inner: Arc<EngineInner<S, T>>,
}

impl<S: OutcomeStore + ?Sized, T: FeedTransport> Clone for AnalyticsEngine<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: OutcomeStore + ?Sized, T: FeedTransport> AnalyticsEngine<S, T> {
    pub fn new(store: Arc<S>, feed: LiveFeedClient<T>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                feed,
                streams: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                next_pass: AtomicU64::new(1),
                succeeded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Start owning a snapshot for `stream_id` and run the first pass.
    ///
    /// Attaching an already attached stream only adds a reference; the
    /// existing options and snapshot are kept and no extra pass runs.
    ///
    /// # Errors
    /// Returns `DomainError::ZeroCapacity` if `options.window_capacity == 0`.
    #[instrument(skip(self, options), fields(stream = stream_id))]
    pub async fn attach(
        &self,
        stream_id: &str,
        options: AttachOptions,
    ) -> Result<AnalyticsHandle, DomainError> {
        if options.window_capacity == 0 {
            return Err(DomainError::ZeroCapacity);
        }
        let options = AttachOptions {
            refresh_interval: options.refresh_interval.max(MIN_REFRESH_INTERVAL),
            ..options
        };

        let generation = {
            let mut streams = self.inner.streams.lock();
            if let Some(entry) = streams.get_mut(stream_id) {
                entry.refs += 1;
                debug!(refs = entry.refs, "Stream already attached, reference added");
                return Ok(AnalyticsHandle {
                    stream_id: stream_id.to_string(),
                    generation: entry.generation,
                });
            }

            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
            let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
            let listener: Listener = Arc::new(move |_: &Outcome| {
                let _ = trigger_tx.send(());
            });

            let tasks = [
                tokio::spawn(run_timer(
                    Arc::clone(&self.inner),
                    stream_id.to_string(),
                    generation,
                    options,
                )),
                tokio::spawn(run_triggers(
                    Arc::clone(&self.inner),
                    stream_id.to_string(),
                    generation,
                    options.window_capacity,
                    trigger_rx,
                )),
            ];

            self.inner
                .feed
                .subscribe(Topic::Stream(stream_id.to_string()), Arc::clone(&listener));

            streams.insert(
                stream_id.to_string(),
                StreamEntry {
                    generation,
                    applied_pass: 0,
                    refs: 1,
                    options,
                    view: AnalyticsView::Loading,
                    listener,
                    tasks,
                },
            );
            generation
        };

        info!(
            window_capacity = options.window_capacity,
            refresh_interval_ms = options.refresh_interval.as_millis(),
            "Analytics attached"
        );

        self.inner
            .refresh(stream_id, generation, options.window_capacity)
            .await;

        Ok(AnalyticsHandle {
            stream_id: stream_id.to_string(),
            generation,
        })
    }

    /// Release one reference. The stream is torn down with its last handle.
    ///
    /// Handles from an earlier attachment of the same stream are ignored.
    pub fn detach(&self, handle: AnalyticsHandle) {
        let mut streams = self.inner.streams.lock();
        let Some(entry) = streams.get_mut(&handle.stream_id) else {
            return;
        };
        if entry.generation != handle.generation {
            debug!(stream = %handle.stream_id, "Ignoring stale analytics handle");
            return;
        }

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            if let Some(entry) = streams.remove(&handle.stream_id) {
                self.inner.teardown(&handle.stream_id, entry);
            }
        }
    }

    /// Tear the stream down regardless of outstanding handles.
    ///
    /// Returns false if the stream was not attached.
    pub fn detach_stream(&self, stream_id: &str) -> bool {
        let removed = self.inner.streams.lock().remove(stream_id);
        match removed {
            Some(entry) => {
                self.inner.teardown(stream_id, entry);
                true
            }
            None => false,
        }
    }

    /// Latest view of `stream_id`, or `None` if it is not attached.
    pub fn get_snapshot(&self, stream_id: &str) -> Option<AnalyticsView> {
        self.inner
            .streams
            .lock()
            .get(stream_id)
            .map(|entry| entry.view.clone())
    }

    /// Options in effect for an attached stream.
    pub fn options(&self, stream_id: &str) -> Option<AttachOptions> {
        self.inner.streams.lock().get(stream_id).map(|e| e.options)
    }

    /// Currently attached streams, sorted.
    pub fn attached_streams(&self) -> Vec<StreamId> {
        let mut streams: Vec<_> = self.inner.streams.lock().keys().cloned().collect();
        streams.sort();
        streams
    }

    pub fn refresh_stats(&self) -> RefreshStats {
        RefreshStats {
            succeeded: self.inner.succeeded.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    /// Live feed client the engine listens on.
    pub fn feed(&self) -> &LiveFeedClient<T> {
        &self.inner.feed
    }

    /// Persist `outcome`, then refresh its stream if it is attached.
    ///
    /// The refresh starts only after the write returned, so the new outcome
    /// is part of the window it reads.
    ///
    /// # Errors
    /// Returns the store's `FetchError` if the append fails. No refresh runs then.
    #[instrument(skip(self, outcome), fields(stream = outcome.stream_id(), value = outcome.value()))]
    pub async fn ingest(&self, outcome: &Outcome) -> Result<(), FetchError> {
        self.inner.store.append(outcome).await?;

        let attached = self
            .inner
            .streams
            .lock()
            .get(outcome.stream_id())
            .map(|entry| (entry.generation, entry.options.window_capacity));
        if let Some((generation, capacity)) = attached {
            self.inner
                .refresh(outcome.stream_id(), generation, capacity)
                .await;
        }
        Ok(())
    }

    /// Record every outcome seen on the feed through [`Self::ingest`].
    ///
    /// Listeners run inside dispatch, so the writes happen on a spawned task
    /// fed through a channel, in arrival order.
    pub fn record_feed(&self) -> FeedRecorder<T> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
        let listener: Listener = Arc::new(move |outcome: &Outcome| {
            let _ = tx.send(outcome.clone());
        });
        self.inner.feed.subscribe(Topic::All, Arc::clone(&listener));

        let engine = self.clone();
        let task = tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                if let Err(e) = engine.ingest(&outcome).await {
                    warn!(error = %e, stream = outcome.stream_id(), "Failed to record outcome");
                }
            }
        });
        info!("Recording live feed outcomes");

        FeedRecorder {
            feed: self.inner.feed.clone(),
            listener,
            task,
        }
    }
}

/// Running feed recorder started by [`AnalyticsEngine::record_feed`].
#[must_use = "dropping the recorder leaves it running"]
pub struct FeedRecorder<T: FeedTransport> {
    feed: LiveFeedClient<T>,
    listener: Listener,
    task: JoinHandle<()>,
}

impl<T: FeedTransport> FeedRecorder<T> {
    /// Stop listening and abort pending writes.
    pub fn stop(self) {
        self.feed.unsubscribe(Topic::All, &self.listener);
        self.task.abort();
    }
}

impl<S: OutcomeStore + ?Sized, T: FeedTransport> EngineInner<S, T> {
    /// One fetch-and-recompute pass.
    async fn refresh(&self, stream_id: &str, generation: u64, capacity: usize) {
        let pass = self.next_pass.fetch_add(1, Ordering::Relaxed);
        let fetched = self.store.fetch_recent(stream_id, capacity).await;

        let computed = fetched.map(|outcomes| {
            OutcomeWindow::from_recent(outcomes, capacity)
                .map(|window| compute_snapshot(stream_id, window))
        });

        let mut streams = self.streams.lock();
        let Some(entry) = streams
            .get_mut(stream_id)
            .filter(|entry| entry.generation == generation)
        else {
            debug!(stream = stream_id, generation, "Discarding pass for detached stream");
            return;
        };
        if pass < entry.applied_pass {
            debug!(stream = stream_id, pass, applied = entry.applied_pass, "Discarding superseded pass");
            return;
        }
        entry.applied_pass = pass;

        let failure = match computed {
            Ok(Ok(snapshot)) => {
                debug!(
                    stream = stream_id,
                    window = snapshot.window.len(),
                    streak = snapshot.current_streak.count,
                    "Analytics refreshed"
                );
                entry.view = AnalyticsView::Ready {
                    snapshot: Arc::new(snapshot),
                    error: None,
                };
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        warn!(stream = stream_id, error = %failure, "Analytics refresh failed");
        self.failed.fetch_add(1, Ordering::Relaxed);
        entry.view = match std::mem::replace(&mut entry.view, AnalyticsView::Loading) {
            AnalyticsView::Ready { snapshot, .. } => AnalyticsView::Ready {
                snapshot,
                error: Some(failure),
            },
            AnalyticsView::Loading | AnalyticsView::Failed { .. } => {
                AnalyticsView::Failed { error: failure }
            }
        };
    }

    fn teardown(&self, stream_id: &str, entry: StreamEntry) {
        for task in &entry.tasks {
            task.abort();
        }
        self.feed
            .unsubscribe(Topic::Stream(stream_id.to_string()), &entry.listener);
        info!(stream = stream_id, "Analytics detached");
    }
}

async fn run_timer<S: OutcomeStore + ?Sized, T: FeedTransport>(
    inner: Arc<EngineInner<S, T>>,
    stream_id: StreamId,
    generation: u64,
    options: AttachOptions,
) {
    let period = options.refresh_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        inner
            .refresh(&stream_id, generation, options.window_capacity)
            .await;
    }
}

async fn run_triggers<S: OutcomeStore + ?Sized, T: FeedTransport>(
    inner: Arc<EngineInner<S, T>>,
    stream_id: StreamId,
    generation: u64,
    capacity: usize,
    mut triggers: mpsc::UnboundedReceiver<()>,
) {
    while triggers.recv().await.is_some() {
        // A burst of notifications needs only one pass.
        while triggers.try_recv().is_ok() {}
        inner.refresh(&stream_id, generation, capacity).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = AttachOptions::default();
        assert_eq!(options.window_capacity, 100);
        assert_eq!(options.refresh_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_view_accessors() {
        assert!(AnalyticsView::Loading.is_loading());
        assert_eq!(AnalyticsView::Loading.error(), None);

        let failed = AnalyticsView::Failed {
            error: "down".into(),
        };
        assert_eq!(failed.error(), Some("down"));
        assert!(failed.snapshot().is_none());

        let window = OutcomeWindow::new(3).unwrap();
        let ready = AnalyticsView::Ready {
            snapshot: Arc::new(compute_snapshot("A", window)),
            error: Some("stale".into()),
        };
        assert_eq!(ready.error(), Some("stale"));
        assert_eq!(ready.snapshot().map(|s| s.stream_id.as_str()), Some("A"));
    }
}
