//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Shortest accepted timer refresh period (milliseconds).
const MIN_REFRESH_INTERVAL_MS: u64 = 100;

/// Largest accepted analytics window.
pub const MAX_WINDOW_CAPACITY: usize = 10_000;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
  let path = path.as_ref();

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    streams = config.analytics.streams.len(),
    window = config.analytics.window_capacity,
    backend = ?config.persistence.backend,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
  // Feed validation
  let url = &config.feed.ws_url;
  anyhow::ensure!(!url.is_empty(), "WebSocket URL must not be empty");
  anyhow::ensure!(
    url.starts_with("ws://") || url.starts_with("wss://"),
    "WebSocket URL must start with ws:// or wss://, got {url}"
  );
  anyhow::ensure!(
    config.feed.backoff_base_ms > 0,
    "backoff_base_ms must be positive"
  );
  anyhow::ensure!(
    config.feed.backoff_max_ms >= config.feed.backoff_base_ms,
    "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
    config.feed.backoff_max_ms,
    config.feed.backoff_base_ms
  );

  // Analytics validation
  anyhow::ensure!(
    config.analytics.window_capacity >= 1,
    "window_capacity must be at least 1"
  );
  anyhow::ensure!(
    config.analytics.window_capacity <= MAX_WINDOW_CAPACITY,
    "window_capacity must be <= {MAX_WINDOW_CAPACITY}, got {}",
    config.analytics.window_capacity
  );
  anyhow::ensure!(
    config.analytics.refresh_interval_ms >= MIN_REFRESH_INTERVAL_MS,
    "refresh_interval_ms must be >= {MIN_REFRESH_INTERVAL_MS}, got {}",
    config.analytics.refresh_interval_ms
  );
  for (i, stream) in config.analytics.streams.iter().enumerate() {
    anyhow::ensure!(
      !stream.trim().is_empty() && stream != "*",
      "Stream {i} must be a concrete stream id, got {stream:?}"
    );
  }

  // Persistence validation
  anyhow::ensure!(
    !config.persistence.data_dir.is_empty(),
    "data_dir must not be empty"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::StoreBackend;

  const MINIMAL: &str = r#"
    [app]
    name = "pulse"

    [feed]
    ws_url = "ws://localhost:3001"
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_defaults_applied() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.app.log_level, "info");
    assert_eq!(config.feed.backoff_base_ms, 1_000);
    assert_eq!(config.feed.backoff_max_ms, 30_000);
    assert_eq!(config.analytics.window_capacity, 100);
    assert_eq!(config.analytics.refresh_interval_ms, 15_000);
    assert!(config.analytics.streams.is_empty());
    assert_eq!(config.persistence.backend, StoreBackend::Jsonl);
    assert_eq!(config.metrics.health_port, 8080);
  }

  #[test]
  fn test_full_config() {
    let config = parse_config(
      r#"
        [app]
        name = "pulse"
        log_level = "debug"

        [feed]
        ws_url = "wss://feed.example.com/ws"
        backoff_base_ms = 500
        backoff_max_ms = 8000

        [analytics]
        window_capacity = 50
        refresh_interval_ms = 5000
        streams = ["Lightning Roulette", "Auto Roulette"]

        [persistence]
        backend = "memory"

        [metrics]
        enabled = false
      "#,
    )
    .unwrap();

    assert_eq!(config.analytics.streams.len(), 2);
    assert_eq!(config.persistence.backend, StoreBackend::Memory);
    assert!(!config.metrics.enabled);
    let backoff = config.feed.backoff();
    assert_eq!(backoff.delay(1).as_millis(), 500);
    assert_eq!(config.analytics.attach_options().window_capacity, 50);
  }

  #[test]
  fn test_rejects_bad_values() {
    let bad_url = MINIMAL.replace("ws://localhost:3001", "http://localhost:3001");
    assert!(parse_config(&bad_url).is_err());

    let bad_backoff = format!("{MINIMAL}\nbackoff_base_ms = 5000\nbackoff_max_ms = 1000\n");
    assert!(parse_config(&bad_backoff).is_err());

    let zero_window = format!("{MINIMAL}\n[analytics]\nwindow_capacity = 0\n");
    assert!(parse_config(&zero_window).is_err());

    let huge_window = format!("{MINIMAL}\n[analytics]\nwindow_capacity = 1000000000000\n");
    assert!(parse_config(&huge_window).is_err());

    let largest = format!("{MINIMAL}\n[analytics]\nwindow_capacity = {MAX_WINDOW_CAPACITY}\n");
    assert!(parse_config(&largest).is_ok());

    let fast_refresh = format!("{MINIMAL}\n[analytics]\nrefresh_interval_ms = 10\n");
    assert!(parse_config(&fast_refresh).is_err());

    let wildcard = format!("{MINIMAL}\n[analytics]\nstreams = [\"*\"]\n");
    assert!(parse_config(&wildcard).is_err());
  }
}
