//! Runtime events: types and broadcast bus.
//!
//! Components report what they do by publishing [`Event`]s on a [`Bus`]
//! handed to them at construction; they never log through a global.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registration`, `LeaseElection`, `RoleSupervisor`,
//!   `SupervisionGroup`, `WatchStream`, `EventRecorder`, `Node`, `SubscriberSet`.
//! - **Consumers**: [`SubscriberSet::listen`](crate::SubscriberSet::listen) fanning
//!   out to [`Subscribe`](crate::Subscribe) implementations such as `LogWriter`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
