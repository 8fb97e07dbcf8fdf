//! # nodevisor
//!
//! **Nodevisor** is the coordination and supervision layer of a cluster member.
//!
//! A node keeps a leased registration key alive (fenced by the key's create
//! revision), campaigns for leadership, starts leader-only subsystems while it
//! leads, and records aggregated operational events into the coordination
//! store. Any mandatory member ending tears the whole node run down; the
//! restart loop then begins a fresh membership term.
//!
//! ## Architecture
//! ```text
//!                         Node::run(ctx)
//!                              │
//!            ┌─────────────────┼────────────────────────────┐
//!            ▼                 ▼                            ▼
//!     EventRecorder     SupervisionGroup(scope)      RoleSupervisor
//!   (dispatch + flush)   ├─ Registration            (follows Role watch)
//!            │           ├─ LeaseElection ──Role──►  ├─ user slots
//!            │           ├─ pipe manager             ├─ ClusterMonitor
//!            │           └─ StatusManager            └─ EventPruner
//!            ▼                 │
//!     CoordinationStore ◄──────┘ (leases, put_if_absent, watch)
//!
//!     every component ── publish(Event) ──► Bus ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Membership term
//! ```text
//! connect ─► read node record ─► claim register/<name> ─► keepalive + fencing
//!                                       │
//!   first member exit / ctx cancelled ──┴─► cancel scope ─► revoke leases ─► NodeStopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                            |
//! |-------------------|-----------------------------------------------------------------|-----------------------------------------------|
//! | **Store**         | Coordination store contract and an in-memory implementation.    | [`CoordinationStore`], [`MemoryStore`]        |
//! | **Ownership**     | Leased keys with keepalive and fencing.                         | [`Registration`], [`RegistrationLease`]       |
//! | **Election**      | Leader election publishing a role watch.                        | [`Election`], [`LeaseElection`], [`Role`]     |
//! | **Supervision**   | Member groups and leader-only subsystems.                       | [`SupervisionGroup`], [`RoleSupervisor`]      |
//! | **Events**        | Aggregated operational events persisted to the store.           | [`EventRecorder`], [`AggregatedEvent`]        |
//! | **Observability** | Lifecycle events on a bus, rendered through `tracing`.          | [`Bus`], [`Subscribe`], [`LogWriter`]         |
//! | **Configuration** | Cadences, capacities and policy constants.                      | [`Config`]                                    |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nodevisor::{Keyspace, MemoryStore, Node, NodeInfo, StoreRef};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     let conn: StoreRef = Arc::new(store.clone());
//!     NodeInfo::new("n1").save(&conn, &Keyspace::default()).await?;
//!
//!     let node = Node::builder("n1", Arc::new(store)).build();
//!     let ctx = CancellationToken::new();
//!     let stop = ctx.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(200)).await;
//!         stop.cancel();
//!     });
//!
//!     node.run(&ctx).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod election;
mod error;
mod events;
mod monitor;
mod node;
mod policies;
mod recorder;
mod registration;
mod store;
mod subscribers;
mod supervision;
mod tasks;
mod watch;

pub mod logging;

// ---- Public re-exports ----

pub use config::{Config, NodeConfig, RecorderConfig, RegistrationConfig, RoleConfig, WatchConfig};
pub use election::{Election, LeaseElection, Role};
pub use error::{NodeError, RegistrationError, ServiceError, StoreError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use monitor::{ChangeScope, ClusterChange, ClusterMonitor};
pub use node::{Node, NodeBuilder, NodeInfo, NodeStatus, StatusManager, wait_for_shutdown_signal};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use recorder::{
    AggregatedEvent, Clock, EventPruner, EventRecorder, EventRecorderBuilder, EventSink,
    EventType, ManualClock, ResourceType, StoreEventSink, SystemClock,
};
pub use registration::{Registration, RegistrationLease};
pub use store::{
    Connect, CoordinationStore, KeyValue, Keyspace, LeaseId, MemoryStore, PutOutcome, StoreRef,
    WatchEvent, WatchEventKind, WatchEvents,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use supervision::{LeaderSlot, RoleSupervisor, Service, ServiceStatus, SupervisionGroup, TaskService};
pub use tasks::{Task, TaskFn, TaskRef};
pub use watch::WatchStream;
