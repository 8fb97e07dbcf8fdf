//! # Supervision primitives.
//!
//! - [`SupervisionGroup`] fail-fast fan-in: the group ends when its parent is
//!   cancelled or when any member's liveness signal fires, and every member is
//!   cancelled with it.
//! - [`Service`] start/stop/status contract of leader-only subsystems, with
//!   [`TaskService`] adapting any [`Task`](crate::Task).
//! - [`RoleSupervisor`] the single task owning every leader-only subsystem,
//!   starting and stopping them as the role changes.

mod group;
mod role;
mod service;

pub use group::SupervisionGroup;
pub use role::{LeaderSlot, RoleSupervisor};
pub use service::{Service, ServiceStatus, TaskService};
