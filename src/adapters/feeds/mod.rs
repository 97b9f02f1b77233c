//! Notification Transport Adapters
//!
//! Implementations of the `FeedTransport` port:
//! - `ws`: WebSocket client (tokio-tungstenite)
//! - `memory`: in-process channels with a scriptable publisher

pub mod memory;
pub mod ws;

pub use memory::{MemoryPublisher, MemorySession, MemoryTransport};
pub use ws::{WsSession, WsTransport};
