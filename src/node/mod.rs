//! # Node: the per-process supervisor.
//!
//! ```text
//! Node::run(ctx)
//!   ├─ refresh own record (<prefix>/nodes/<name>)      missing → NodeError::MissingNode
//!   ├─ EventRecorder (leaf, not part of the fan-in)
//!   ├─ SupervisionGroup "must run"
//!   │    ├─ Registration     (<prefix>/register/<name>)
//!   │    ├─ LeaseElection    (<prefix>/election)
//!   │    ├─ pipe manager     (application task)
//!   │    └─ StatusManager    (<prefix>/status/<name>)
//!   └─ RoleSupervisor (same parent)
//!        ├─ application leader slots (scheduler, ...)
//!        ├─ ClusterMonitor
//!        └─ EventPruner ("event-manager")
//! ```
//!
//! The first mandatory member to end tears the run down; [`Node::run_with_restart`]
//! starts a fresh run after a backoff delay.

mod info;
mod node;
mod shutdown;
mod status;

pub use info::{NodeInfo, NodeStatus};
pub use node::{Node, NodeBuilder};
pub use shutdown::wait_for_shutdown_signal;
pub use status::StatusManager;
