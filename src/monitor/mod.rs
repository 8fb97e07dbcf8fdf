//! # Cluster monitoring while leader.
//!
//! [`ClusterMonitor`] watches the node, pipeline and status prefixes and
//! forwards each change as a [`ClusterChange`] to its subscribers. The three
//! watches form one [`SupervisionGroup`](crate::SupervisionGroup): when any of
//! them ends, the monitor stops and reports `"stop"`, and the role supervisor
//! starts a fresh one on its next re-check.

mod change;
mod monitor;

pub use change::{ChangeScope, ClusterChange};
pub use monitor::ClusterMonitor;
