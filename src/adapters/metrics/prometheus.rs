//! Prometheus Metrics Registry - Feed and Analytics Observability
//!
//! Registers the `roulette_pulse_*` metrics and serves them on `/metrics`.
//! The feed client and engine keep their own atomic counters; `observe`
//! copies them into the registry so the core stays free of prometheus.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::usecases::analytics_engine::RefreshStats;
use crate::usecases::live_feed::{ConnectionState, FeedStatsSnapshot};

/// Centralized Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// 1 while the live feed is connected.
    pub feed_connected: IntGauge,
    /// Transport errors that scheduled a reconnect.
    pub feed_reconnects: IntCounter,
    pub feed_events_dispatched: IntCounter,
    pub feed_malformed_messages: IntCounter,
    pub listener_failures: IntCounter,
    /// Analytics passes by `result` (`ok` / `error`).
    pub analytics_refresh: IntCounterVec,
    /// Streams currently attached to the engine.
    pub attached_streams: IntGauge,
}

impl MetricsRegistry {
    /// Create and register all metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let feed_connected = IntGauge::new(
            "roulette_pulse_feed_connected",
            "Live feed connection status (1=connected, 0=disconnected)",
        )?;
        let feed_reconnects = IntCounter::new(
            "roulette_pulse_feed_reconnects_total",
            "Transport errors followed by a scheduled reconnect",
        )?;
        let feed_events_dispatched = IntCounter::new(
            "roulette_pulse_feed_events_dispatched_total",
            "Outcomes dispatched to listeners",
        )?;
        let feed_malformed_messages = IntCounter::new(
            "roulette_pulse_feed_malformed_messages_total",
            "Feed frames dropped as malformed",
        )?;
        let listener_failures = IntCounter::new(
            "roulette_pulse_listener_failures_total",
            "Listener invocations that panicked",
        )?;
        let analytics_refresh = IntCounterVec::new(
            Opts::new(
                "roulette_pulse_analytics_refresh_total",
                "Analytics refresh passes by result",
            ),
            &["result"],
        )?;
        let attached_streams = IntGauge::new(
            "roulette_pulse_attached_streams",
            "Streams attached to the analytics engine",
        )?;

        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(feed_reconnects.clone()))?;
        registry.register(Box::new(feed_events_dispatched.clone()))?;
        registry.register(Box::new(feed_malformed_messages.clone()))?;
        registry.register(Box::new(listener_failures.clone()))?;
        registry.register(Box::new(analytics_refresh.clone()))?;
        registry.register(Box::new(attached_streams.clone()))?;

        Ok(Self {
            registry,
            feed_connected,
            feed_reconnects,
            feed_events_dispatched,
            feed_malformed_messages,
            listener_failures,
            analytics_refresh,
            attached_streams,
        })
    }

    /// Bring the registry up to date with the latest component counters.
    pub fn observe(
        &self,
        state: &ConnectionState,
        feed: &FeedStatsSnapshot,
        refresh: &RefreshStats,
        attached: usize,
    ) {
        self.feed_connected.set(i64::from(state.is_connected()));
        advance(&self.feed_reconnects, feed.transport_errors);
        advance(&self.feed_events_dispatched, feed.events_dispatched);
        advance(&self.feed_malformed_messages, feed.malformed_messages);
        advance(&self.listener_failures, feed.listener_failures);
        advance(&self.analytics_refresh.with_label_values(&["ok"]), refresh.succeeded);
        advance(&self.analytics_refresh.with_label_values(&["error"]), refresh.failed);
        self.attached_streams
            .set(i64::try_from(attached).unwrap_or(i64::MAX));
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

/// Move a counter forward to `total`. Counters never go back.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::usecases::live_feed::ConnectionStatus;

    #[test]
    fn test_observe_tracks_totals() {
        let metrics = MetricsRegistry::new().unwrap();
        let state = ConnectionState {
            status: ConnectionStatus::Connected,
            attempt: 0,
            backoff: Duration::from_secs(1),
        };
        let feed = FeedStatsSnapshot {
            events_dispatched: 7,
            malformed_messages: 1,
            listener_failures: 0,
            transport_errors: 2,
        };
        let refresh = RefreshStats {
            succeeded: 4,
            failed: 1,
        };

        metrics.observe(&state, &feed, &refresh, 2);
        metrics.observe(&state, &feed, &refresh, 2);

        assert_eq!(metrics.feed_connected.get(), 1);
        assert_eq!(metrics.feed_events_dispatched.get(), 7);
        assert_eq!(metrics.feed_reconnects.get(), 2);
        assert_eq!(metrics.analytics_refresh.with_label_values(&["ok"]).get(), 4);
        assert_eq!(metrics.attached_streams.get(), 2);

        let text = metrics.render();
        assert!(text.contains("roulette_pulse_feed_events_dispatched_total 7"));
        assert!(text.contains("roulette_pulse_analytics_refresh_total{result=\"error\"} 1"));
    }
}
