//! Roulette Pulse - Entry Point
//!
//! Composition root: builds the one live feed client and one analytics
//! engine for this process and runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Build the outcome store (JSONL or memory)
//! 4. Create the LiveFeedClient over a WebSocket transport
//! 5. Register the wildcard trace listener
//! 6. Create the engine, start the feed recorder if enabled, attach streams
//! 7. Spawn health server, metrics server and the periodic summary task
//! 8. Wait for SIGINT → detach streams, disconnect feed, stop servers

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use roulette_pulse::adapters::feeds::WsTransport;
use roulette_pulse::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use roulette_pulse::adapters::persistence::{JsonlOutcomeStore, MemoryOutcomeStore};
use roulette_pulse::config::{self, StoreBackend};
use roulette_pulse::domain::outcome::Outcome;
use roulette_pulse::ports::outcome_store::OutcomeStore;
use roulette_pulse::usecases::{AnalyticsEngine, AnalyticsView, Listener, LiveFeedClient, Topic};

type Engine = AnalyticsEngine<dyn OutcomeStore, WsTransport>;

/// Period of the snapshot summary log and metrics sync.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        ws_url = %config.feed.ws_url,
        streams = config.analytics.streams.len(),
        "Starting Roulette Pulse"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Outcome store ────────────────────────────────────
    let store: Arc<dyn OutcomeStore> = match config.persistence.backend {
        StoreBackend::Jsonl => Arc::new(
            JsonlOutcomeStore::new(&config.persistence.data_dir)
                .await
                .context("Failed to open JSONL outcome store")?,
        ),
        StoreBackend::Memory => Arc::new(MemoryOutcomeStore::default()),
    };
    if !store.is_healthy().await {
        warn!(backend = ?config.persistence.backend, "Outcome store failed its health check");
    }

    // ── 4. Live feed client ─────────────────────────────────
    let feed = LiveFeedClient::new(WsTransport::new(&config.feed.ws_url), config.feed.backoff());

    // ── 5. Trace listener ──────────────────────────────────
    let trace_listener: Listener = Arc::new(|outcome: &Outcome| {
        debug!(
            stream = outcome.stream_id(),
            value = outcome.value(),
            color = %outcome.color(),
            occurred_at = %outcome.occurred_at(),
            "Outcome received"
        );
    });
    feed.subscribe(Topic::All, trace_listener);

    // ── 6. Analytics engine ─────────────────────────────────
    let engine: Engine = AnalyticsEngine::new(Arc::clone(&store), feed.clone());
    let recorder = config.persistence.record_feed.then(|| engine.record_feed());

    let options = config.analytics.attach_options();
    let mut handles = Vec::with_capacity(config.analytics.streams.len());
    for stream in &config.analytics.streams {
        let handle = engine
            .attach(stream, options)
            .await
            .with_context(|| format!("Failed to attach analytics for {stream}"))?;
        handles.push(handle);
    }

    // ── 7. Health, metrics, summary ─────────────────────────
    let health = HealthServer::new(HealthState::new(feed.watch_state()), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics = if config.metrics.enabled {
        let registry = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
        let serve_registry = Arc::clone(&registry);
        let bind_address = config.metrics.bind_address.clone();
        let metrics_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = serve_registry.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        });
        Some(registry)
    } else {
        None
    };

    let summary_handle = tokio::spawn(run_summary(
        engine.clone(),
        metrics,
        shutdown_tx.subscribe(),
    ));

    info!(attached = ?engine.attached_streams(), "All tasks spawned, service is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT, shutting down");
    }
    info!("SIGINT received, initiating graceful shutdown");

    let _ = shutdown_tx.send(());
    for handle in handles {
        engine.detach(handle);
    }
    if let Some(recorder) = recorder {
        recorder.stop();
    }
    feed.disconnect();

    let _ = tokio::time::timeout(Duration::from_secs(5), summary_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;

    info!("Shutdown complete");
    Ok(())
}

/// Periodically log a one-line summary per stream and sync metrics.
async fn run_summary(
    engine: Engine,
    metrics: Option<Arc<MetricsRegistry>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        let feed = engine.feed();
        let streams = engine.attached_streams();
        if let Some(metrics) = &metrics {
            metrics.observe(
                &feed.connection_state(),
                &feed.stats(),
                &engine.refresh_stats(),
                streams.len(),
            );
        }

        let state = feed.connection_state();
        info!(
            status = ?state.status,
            attempt = state.attempt,
            events = feed.stats().events_dispatched,
            "Feed status"
        );

        for stream in streams {
            match engine.get_snapshot(&stream) {
                Some(AnalyticsView::Ready { snapshot, error }) => {
                    let missing = snapshot.most_missing_dozen();
                    info!(
                        stream = %stream,
                        window = snapshot.window.len(),
                        streak = ?snapshot.current_streak.label,
                        streak_count = snapshot.current_streak.count,
                        most_missing = ?missing.map(|m| m.dozen),
                        absence = missing.map_or(0, |m| m.absence),
                        stale = error.is_some(),
                        "Analytics summary"
                    );
                }
                Some(AnalyticsView::Failed { error }) => {
                    warn!(stream = %stream, error = %error, "Analytics unavailable");
                }
                Some(AnalyticsView::Loading) | None => {
                    debug!(stream = %stream, "Analytics still loading");
                }
            }
        }
    }

    info!("Summary task stopped");
}
