//! Coordination-store contract and an in-process implementation.
//!
//! The runtime only needs a consistent key-value store with:
//! - atomic create-if-absent puts,
//! - lease-scoped keys with TTL and one-shot keepalive,
//! - revision-stamped reads,
//! - a prefix watch delivering put/delete events with raw payloads.
//!
//! ## Contents
//! - [`CoordinationStore`], [`Connect`] the contract consumed by every component
//! - [`KeyValue`], [`PutOutcome`], [`WatchEvent`], [`WatchEventKind`] data carried across it
//! - [`Keyspace`] deterministic key layout under one prefix
//! - [`MemoryStore`] single-process implementation (tests, demos, standalone mode)

mod keys;
mod memory;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use keys::Keyspace;
pub use memory::MemoryStore;
pub use store::{
    Connect, CoordinationStore, KeyValue, LeaseId, PutOutcome, StoreRef, WatchEvent,
    WatchEventKind, WatchEvents,
};
