//! Persistence Adapters - Outcome Stores
//!
//! Implements the `OutcomeStore` port:
//! - `jsonl`: append-only JSON Lines file per stream
//! - `memory`: bounded per-stream history held in process

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlOutcomeStore;
pub use memory::MemoryOutcomeStore;
