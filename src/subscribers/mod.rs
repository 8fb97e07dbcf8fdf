//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Component ── publish(Event) ──► Bus ──► SubscriberSet::listen
//!                                              │
//!                                    ┌─────────┼─────────┐
//!                                    ▼         ▼         ▼
//!                               [queue S1] [queue S2] [queue SN]
//!                                    ▼         ▼         ▼
//!                                LogWriter   Metrics   Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use async_trait::async_trait;
//! use nodevisor::{Event, EventKind, Subscribe};
//!
//! struct LeaseAlarm;
//!
//! #[async_trait]
//! impl Subscribe for LeaseAlarm {
//!     async fn on_event(&self, event: &Event) {
//!         if matches!(event.kind, EventKind::RegistrationLost) {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "lease-alarm" }
//! }
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
