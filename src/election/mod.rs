//! # Leader election.
//!
//! [`Election`] is the capability the rest of the runtime depends on: a task
//! that publishes the local node's [`Role`] through a `watch` channel.
//! [`LeaseElection`] implements it with the same claim/keepalive/fencing
//! mechanism as [`Registration`](crate::Registration), on a single cluster-wide
//! election key.

mod lease;
mod role;

pub use lease::LeaseElection;
pub use role::Role;

use tokio::sync::watch;

use crate::tasks::Task;

/// Role publisher.
///
/// `roles()` has last-known-value semantics: a receiver always observes the
/// current role, and `changed()` fires only on actual transitions.
pub trait Election: Task {
    /// Current role.
    fn role(&self) -> Role;

    /// Receiver of role transitions.
    fn roles(&self) -> watch::Receiver<Role>;
}
