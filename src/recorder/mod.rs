//! Operational event recording.
//!
//! High-volume, repetitive conditions ("pipeline p1 failed: boom" every few
//! milliseconds) are merged into counted [`AggregatedEvent`]s before they reach
//! the store.
//!
//! ```text
//! EventRecorder::event(e) ─► [ingest chan] ─► dispatch loop (LRU of aggregation keys)
//!                                                   │ count / first_time / last_time
//!                                                   ▼
//!                                             [flush chan] ─► flush loop (pending map)
//!                                                                 │ size >= threshold or tick
//!                                                                 ▼
//!                                                           EventSink::upsert
//! ```
//!
//! ## Contents
//! - [`EventRecorder`] ingest handle plus its two loops
//! - [`AggregatedEvent`], [`EventType`], [`ResourceType`] the persisted record
//! - [`EventSink`], [`StoreEventSink`] where records go
//! - [`EventPruner`] leader-only task deleting records past retention
//! - [`Clock`], [`SystemClock`], [`ManualClock`] time source for timestamps and windows

mod clock;
mod event;
mod pruner;
mod recorder;
mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{AggregatedEvent, EventType, ResourceType};
pub use pruner::EventPruner;
pub use recorder::{EventRecorder, EventRecorderBuilder};
pub use sink::{EventSink, StoreEventSink};
