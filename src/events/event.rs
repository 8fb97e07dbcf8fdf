//! # Lifecycle events emitted by nodevisor components.
//!
//! [`EventKind`] classifies what happened:
//! - **Ownership**: registration claims, keepalive and fencing outcomes
//! - **Roles**: role changes and leader-only subsystem transitions
//! - **Supervision**: group members exiting, node start/stop/panic/restart
//! - **Streams & recorder**: watch items skipped, watches ending, flushes, pruning
//! - **Subscribers**: overflow and panic of the observers themselves
//!
//! [`Event`] carries optional metadata (component, key, role, revision, count, reason).
//!
//! ## Ordering guarantees
//! Each event has a process-wide sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use nodevisor::{Event, EventKind, Role};
//!
//! let ev = Event::new(EventKind::RoleChanged)
//!     .with_component("election")
//!     .with_role(Role::Leader);
//!
//! assert_eq!(ev.kind, EventKind::RoleChanged);
//! assert_eq!(ev.component.as_deref(), Some("election"));
//! assert_eq!(ev.role, Some(Role::Leader));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::election::Role;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing (`component` = subscriber).
    SubscriberPanicked,
    /// Subscriber dropped an event because its queue was full or closed.
    SubscriberOverflow,

    // === Ownership ===
    /// Initial conditional claim succeeded (`key`, `revision`).
    RegistrationClaimed,
    /// Claim refused because another owner holds the key (`key`, `revision` of the holder).
    RegistrationRejected,
    /// A held registration ended (`key`, `reason`).
    RegistrationLost,
    /// Keepalive call failed without losing the lease (`key`, `reason`).
    KeepAliveFailed,
    /// Lease revoke after a run ended (`key`, `reason` on failure).
    LeaseRevoked,

    // === Roles ===
    /// The election published a new role (`component`, `role`).
    RoleChanged,
    /// A leader-only subsystem was started (`component`).
    SubsystemStarted,
    /// A leader-only subsystem failed to start (`component`, `reason`).
    SubsystemStartFailed,
    /// A leader-only subsystem was stopped (`component`).
    SubsystemStopped,

    // === Supervision ===
    /// A supervision group member's liveness fired (`component`, `reason` for errors).
    MemberExited,
    /// A node run started (`component` = node name).
    NodeStarted,
    /// A node run ended (`component`, `reason`).
    NodeStopped,
    /// A panic was contained (`component`, `reason`).
    Panicked,
    /// The node restart loop scheduled another run (`component`, `delay_ms`, `attempt`).
    RestartScheduled,

    // === Streams & recorder ===
    /// A single watch notification failed to decode and was skipped (`key`, `reason`).
    WatchItemSkipped,
    /// A watch stream ended (`key` = prefix, `reason`).
    WatchEnded,
    /// Pending aggregated events were written (`count`).
    EventsFlushed,
    /// One aggregated event failed to persist and was dropped (`key`, `reason`).
    EventFlushFailed,
    /// Expired aggregated events were deleted (`count`).
    EventsPruned,
    /// One expired aggregated event could not be deleted and was kept (`key`, `reason`).
    EventPruneFailed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Emitting component (registration, election, subsystem, node, subscriber).
    pub component: Option<Arc<str>>,
    /// Store key or prefix the event refers to.
    pub key: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Role carried by role transitions.
    pub role: Option<Role>,
    /// Store revision.
    pub revision: Option<i64>,
    /// Item count (flushes, prunes).
    pub count: Option<u64>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Attempt number (starting from 1).
    pub attempt: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            component: None,
            key: None,
            reason: None,
            role: None,
            revision: None,
            count: None,
            delay_ms: None,
            attempt: None,
        }
    }

    #[inline]
    pub fn with_component(mut self, component: impl Into<Arc<str>>) -> Self {
        self.component = Some(component.into());
        self
    }

    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    #[inline]
    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    #[inline]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: std::time::Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_component(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_component(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::NodeStarted);
        let b = Event::new(EventKind::NodeStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builders() {
        let ev = Event::new(EventKind::RegistrationClaimed)
            .with_key("/n/register/a")
            .with_revision(7)
            .with_delay(std::time::Duration::from_secs(2));
        assert_eq!(ev.key.as_deref(), Some("/n/register/a"));
        assert_eq!(ev.revision, Some(7));
        assert_eq!(ev.delay_ms, Some(2000));
        assert!(!ev.is_subscriber_event());
        assert!(Event::subscriber_overflow("log", "full").is_subscriber_event());
    }
}
