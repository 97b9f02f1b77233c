//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Endpoints,
//! backoff bounds, window sizes and attached streams all live here;
//! nothing is hardcoded in the domain layer beyond defaults.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::backoff::ReconnectBackoff;
use crate::usecases::analytics_engine::AttachOptions;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub app: AppSection,
  /// Live feed connection.
  pub feed: FeedConfig,
  /// Analytics engine defaults and startup streams.
  #[serde(default)]
  pub analytics: AnalyticsConfig,
  /// Outcome store selection.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Live feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// Notification endpoint (`ws://` or `wss://`).
  pub ws_url: String,
  /// First reconnect delay (milliseconds).
  #[serde(default = "default_backoff_base")]
  pub backoff_base_ms: u64,
  /// Reconnect delay cap (milliseconds).
  #[serde(default = "default_backoff_max")]
  pub backoff_max_ms: u64,
}

impl FeedConfig {
  pub fn backoff(&self) -> ReconnectBackoff {
    ReconnectBackoff::new(
      Duration::from_millis(self.backoff_base_ms),
      Duration::from_millis(self.backoff_max_ms),
    )
  }
}

/// Analytics engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
  /// Outcomes per window.
  #[serde(default = "default_window_capacity")]
  pub window_capacity: usize,
  /// Timer-driven refresh period (milliseconds).
  #[serde(default = "default_refresh_interval")]
  pub refresh_interval_ms: u64,
  /// Streams attached at startup.
  #[serde(default)]
  pub streams: Vec<String>,
}

impl Default for AnalyticsConfig {
  fn default() -> Self {
    Self {
      window_capacity: default_window_capacity(),
      refresh_interval_ms: default_refresh_interval(),
      streams: Vec::new(),
    }
  }
}

impl AnalyticsConfig {
  pub fn attach_options(&self) -> AttachOptions {
    AttachOptions {
      window_capacity: self.window_capacity,
      refresh_interval: Duration::from_millis(self.refresh_interval_ms),
    }
  }
}

/// Outcome store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  /// JSON Lines files under `data_dir`.
  #[default]
  Jsonl,
  /// Process memory only.
  Memory,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for JSONL outcome files.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  #[serde(default)]
  pub backend: StoreBackend,
  /// Append every outcome received from the live feed to the store.
  #[serde(default)]
  pub record_feed: bool,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      backend: StoreBackend::default(),
      record_feed: false,
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_backoff_base() -> u64 {
  1_000
}

fn default_backoff_max() -> u64 {
  30_000
}

fn default_window_capacity() -> usize {
  100
}

fn default_refresh_interval() -> u64 {
  15_000
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
