//! # LeaseElection: leadership as ownership of the election key.
//!
//! ```text
//! loop:
//!   watch election key ─► claim
//!     ├─ claimed        → Leader, hold (keepalive + fencing) → release → Follower → loop
//!     ├─ AlreadyClaimed → Follower, wait for delete of the key or retry interval → loop
//!     └─ store failure  → Unknown, run ends with error
//! ```
//!
//! The role returns to `Unknown` whenever [`Task::run`] returns or unwinds. A
//! held claim is released even if holding it panics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::RegistrationConfig;
use crate::election::{Election, Role};
use crate::error::{RegistrationError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::registration::Registration;
use crate::store::{Connect, Keyspace, WatchEventKind, WatchEvents};
use crate::tasks::Task;

/// [`Election`] backed by a leased claim on [`Keyspace::election`].
pub struct LeaseElection {
    registration: Registration,
    retry: Duration,
    bus: Bus,
    roles: watch::Sender<Role>,
}

impl LeaseElection {
    /// Creates an election campaigning with `payload` (usually the node descriptor).
    pub fn new(
        connector: Arc<dyn Connect>,
        keys: &Keyspace,
        payload: Vec<u8>,
        cfg: RegistrationConfig,
        retry: Duration,
        bus: Bus,
    ) -> Self {
        let (roles, _) = watch::channel(Role::Unknown);
        Self {
            registration: Registration::new(connector, keys.election(), payload, cfg, bus.clone()),
            retry: retry.max(Duration::from_millis(1)),
            bus,
            roles,
        }
    }

    fn publish(&self, role: Role) {
        let changed = self.roles.send_if_modified(|current| {
            if *current == role {
                return false;
            }
            *current = role;
            true
        });
        if changed {
            self.bus.publish(
                Event::new(EventKind::RoleChanged)
                    .with_component("election")
                    .with_key(self.registration.key())
                    .with_role(role),
            );
        }
    }

    async fn campaign(&self, ctx: &CancellationToken) -> Result<(), RegistrationError> {
        let store = self.registration.connect().await?;
        loop {
            if ctx.is_cancelled() {
                return Ok(());
            }
            let mut changes = store.watch_prefix(self.registration.key()).await?;

            match self.registration.claim(&store).await {
                Ok(lease) => {
                    drop(changes);
                    self.publish(Role::Leader);
                    let held = self.registration.hold_then_release(&store, &lease, ctx).await;
                    self.publish(Role::Follower);
                    match held {
                        Ok(()) => return Ok(()),
                        Err(e) if e.is_ownership_lost() => {
                            self.bus.publish(
                                Event::new(EventKind::RegistrationLost)
                                    .with_component("election")
                                    .with_key(self.registration.key())
                                    .with_reason(e.to_string()),
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(RegistrationError::AlreadyClaimed { .. }) => {
                    self.publish(Role::Follower);
                    tokio::select! {
                        _ = ctx.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.retry) => {}
                        _ = vacancy(&mut changes, self.registration.key()) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Completes when the watched key is deleted; never completes if the watch ends first.
async fn vacancy(changes: &mut WatchEvents, key: &str) {
    while let Some(item) = changes.next().await {
        if let Ok(ev) = item {
            if ev.kind == WatchEventKind::Delete && ev.key == key {
                return;
            }
        }
    }
    std::future::pending::<()>().await
}

#[async_trait]
impl Task for LeaseElection {
    fn name(&self) -> &str {
        "election"
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        let outcome = std::panic::AssertUnwindSafe(self.campaign(&ctx))
            .catch_unwind()
            .await;
        self.publish(Role::Unknown);
        match outcome {
            Ok(result) => result.map_err(|e| TaskError::Fail {
                error: e.to_string(),
            }),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Election for LeaseElection {
    fn role(&self) -> Role {
        *self.roles.borrow()
    }

    fn roles(&self) -> watch::Receiver<Role> {
        self.roles.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CoordinationStore, MemoryStore};

    fn election(store: &MemoryStore, name: &str) -> Arc<LeaseElection> {
        Arc::new(LeaseElection::new(
            Arc::new(store.clone()),
            &Keyspace::new("/t"),
            name.as_bytes().to_vec(),
            RegistrationConfig::default(),
            Duration::from_secs(1),
            Bus::new(64),
        ))
    }

    async fn wait_for(rx: &mut watch::Receiver<Role>, role: Role) {
        rx.wait_for(|r| *r == role).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_leader_and_failover() {
        let store = MemoryStore::new();
        let a = election(&store, "a");
        let b = election(&store, "b");
        let (mut ra, mut rb) = (a.roles(), b.roles());
        assert_eq!(a.role(), Role::Unknown);

        let ctx_a = CancellationToken::new();
        let ctx_b = CancellationToken::new();
        let run_a = tokio::spawn({
            let (a, ctx) = (a.clone(), ctx_a.clone());
            async move { a.run(ctx).await }
        });
        wait_for(&mut ra, Role::Leader).await;

        let run_b = tokio::spawn({
            let (b, ctx) = (b.clone(), ctx_b.clone());
            async move { b.run(ctx).await }
        });
        wait_for(&mut rb, Role::Follower).await;
        assert_eq!(
            store.get("/t/election").await.unwrap().unwrap().value,
            b"a".to_vec()
        );

        ctx_a.cancel();
        assert!(run_a.await.unwrap().is_ok());
        assert_eq!(a.role(), Role::Unknown);

        tokio::time::timeout(Duration::from_secs(2), wait_for(&mut rb, Role::Leader))
            .await
            .unwrap();
        assert_eq!(
            store.get("/t/election").await.unwrap().unwrap().value,
            b"b".to_vec()
        );

        ctx_b.cancel();
        assert!(run_b.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stolen_key_demotes_then_recampaigns() {
        let store = MemoryStore::new();
        let a = election(&store, "a");
        let mut ra = a.roles();
        let ctx = CancellationToken::new();
        tokio::spawn({
            let (a, ctx) = (a.clone(), ctx.clone());
            async move { a.run(ctx).await }
        });
        wait_for(&mut ra, Role::Leader).await;

        store.delete("/t/election").await.unwrap();
        store.put("/t/election", b"x".to_vec(), None).await.unwrap();

        tokio::time::timeout(Duration::from_secs(6), wait_for(&mut ra, Role::Follower))
            .await
            .unwrap();

        store.delete("/t/election").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), wait_for(&mut ra, Role::Leader))
            .await
            .unwrap();
        ctx.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_hold_releases_key_and_resets_role() {
        let store = MemoryStore::new();
        let el = Arc::new(LeaseElection::new(
            Arc::new(crate::store::testing::PanickingReads(store.clone())),
            &Keyspace::new("/t"),
            b"a".to_vec(),
            RegistrationConfig::default(),
            Duration::from_secs(1),
            Bus::new(64),
        ));
        let mut roles = el.roles();
        let run = tokio::spawn({
            let el = el.clone();
            async move { el.run(CancellationToken::new()).await }
        });
        wait_for(&mut roles, Role::Leader).await;

        assert!(run.await.unwrap_err().is_panic());
        assert_eq!(el.role(), Role::Unknown);
        assert!(store.get("/t/election").await.unwrap().is_none());
    }
}
