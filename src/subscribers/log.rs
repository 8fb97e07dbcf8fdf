//! # LogWriter: renders lifecycle events as `tracing` records.
//!
//! Levels:
//! - `error`: ownership lost, panics, subscriber failures
//! - `warn`: start failures, skipped items, flush failures, members exiting, restarts
//! - `info`: claims, role changes, subsystem transitions, node start/stop
//! - `debug`: flushes, prunes, keepalive hiccups, revokes

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let component = e.component.as_deref().unwrap_or("-");
        let key = e.key.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::RegistrationClaimed => {
                tracing::info!(component, key, revision = ?e.revision, "registration claimed");
            }
            EventKind::RegistrationRejected => {
                tracing::info!(component, key, holder_revision = ?e.revision, "registration held elsewhere");
            }
            EventKind::RegistrationLost => {
                tracing::error!(component, key, reason, "registration ended");
            }
            EventKind::KeepAliveFailed => {
                tracing::debug!(component, key, reason, "keepalive failed");
            }
            EventKind::LeaseRevoked => {
                tracing::debug!(component, key, reason, "lease revoked");
            }
            EventKind::RoleChanged => {
                tracing::info!(component, role = ?e.role, "role changed");
            }
            EventKind::SubsystemStarted => {
                tracing::info!(component, "leader subsystem started");
            }
            EventKind::SubsystemStartFailed => {
                tracing::warn!(component, reason, "leader subsystem failed to start");
            }
            EventKind::SubsystemStopped => {
                tracing::info!(component, "leader subsystem stopped");
            }
            EventKind::MemberExited => {
                tracing::warn!(component, reason, "supervised member exited");
            }
            EventKind::NodeStarted => {
                tracing::info!(component, "node started");
            }
            EventKind::NodeStopped => {
                tracing::info!(component, reason, "node stopped");
            }
            EventKind::Panicked => {
                tracing::error!(component, reason, "panic contained");
            }
            EventKind::RestartScheduled => {
                tracing::warn!(component, delay_ms = ?e.delay_ms, attempt = ?e.attempt, "node restart scheduled");
            }
            EventKind::WatchItemSkipped => {
                tracing::warn!(component, key, reason, "watch notification skipped");
            }
            EventKind::WatchEnded => {
                tracing::info!(component, prefix = key, reason, "watch ended");
            }
            EventKind::EventsFlushed => {
                tracing::debug!(count = ?e.count, "aggregated events flushed");
            }
            EventKind::EventFlushFailed => {
                tracing::warn!(key, reason, "aggregated event dropped");
            }
            EventKind::EventsPruned => {
                tracing::debug!(count = ?e.count, "expired events pruned");
            }
            EventKind::EventPruneFailed => {
                tracing::warn!(key, reason, "expired event kept");
            }
            EventKind::SubscriberOverflow => {
                tracing::error!(subscriber = component, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(subscriber = component, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::Role;

    #[tokio::test]
    async fn test_every_kind_renders() {
        let w = LogWriter::new();
        for kind in [
            EventKind::RegistrationClaimed,
            EventKind::RegistrationLost,
            EventKind::RoleChanged,
            EventKind::WatchEnded,
            EventKind::EventsFlushed,
            EventKind::EventPruneFailed,
            EventKind::SubscriberPanicked,
        ] {
            let ev = Event::new(kind)
                .with_component("test")
                .with_role(Role::Leader)
                .with_count(1);
            w.on_event(&ev).await;
        }
        assert_eq!(w.name(), "log-writer");
    }
}
