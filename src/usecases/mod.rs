//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain logic with port interfaces.
//!
//! Use cases:
//! - `LiveFeedClient`: shared push subscription with reconnect and fan-out
//! - `AnalyticsEngine`: per-stream windows and snapshot refresh

pub mod analytics_engine;
pub mod live_feed;

pub use analytics_engine::{
    AnalyticsEngine, AnalyticsHandle, AnalyticsView, AttachOptions, FeedRecorder,
};
pub use live_feed::{ConnectionState, ConnectionStatus, Listener, LiveFeedClient, Topic};
