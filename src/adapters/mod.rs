//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure. Each sub-module groups adapters by concern.
//!
//! Adapter categories:
//! - `feeds`: notification transports (WebSocket, in-process)
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL and in-memory outcome stores

pub mod feeds;
pub mod metrics;
pub mod persistence;
