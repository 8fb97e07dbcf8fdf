//! # StatusManager: periodic status report.
//!
//! Writes a [`NodeStatus`] on every tick and on every role transition.
//! A failed write ends the task, which tears the node run down.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::election::Role;
use crate::error::{StoreError, TaskError};
use crate::node::info::NodeStatus;
use crate::store::{Keyspace, StoreRef};
use crate::tasks::Task;

pub struct StatusManager {
    store: StoreRef,
    key: String,
    node: String,
    roles: watch::Receiver<Role>,
    interval: Duration,
}

impl StatusManager {
    pub fn new(
        store: StoreRef,
        keys: &Keyspace,
        node: impl Into<String>,
        roles: watch::Receiver<Role>,
        interval: Duration,
    ) -> Self {
        let node = node.into();
        Self {
            store,
            key: keys.status(&node),
            node,
            roles,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    async fn report(&self, role: Role) -> Result<(), StoreError> {
        let status = NodeStatus {
            node: self.node.clone(),
            role,
            updated_at: Utc::now(),
        };
        self.store
            .put(&self.key, serde_json::to_vec(&status)?, None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Task for StatusManager {
    fn name(&self) -> &str {
        "status-manager"
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        let mut roles = self.roles.clone();
        let mut role = *roles.borrow_and_update();
        let mut publisher_alive = true;
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(()),
                changed = roles.changed(), if publisher_alive => {
                    match changed {
                        Ok(()) => role = *roles.borrow_and_update(),
                        Err(_) => {
                            publisher_alive = false;
                            role = Role::Unknown;
                        }
                    }
                    self.report(role).await?;
                }
                _ = tick.tick() => self.report(role).await?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CoordinationStore, MemoryStore};
    use std::sync::Arc;

    async fn stored(store: &MemoryStore) -> NodeStatus {
        let kv = store.get("/t/status/n1").await.unwrap().unwrap();
        serde_json::from_slice(&kv.value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_role_on_change_and_tick() {
        let store = MemoryStore::new();
        let (tx, rx) = watch::channel(Role::Unknown);
        let mgr = StatusManager::new(
            Arc::new(store.clone()),
            &Keyspace::new("/t"),
            "n1",
            rx,
            Duration::from_secs(5),
        );
        let ctx = CancellationToken::new();
        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { mgr.run(ctx).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(stored(&store).await.role, Role::Unknown);

        tx.send(Role::Leader).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = stored(&store).await;
        assert_eq!(status.role, Role::Leader);
        assert_eq!(status.node, "n1");

        drop(tx);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(stored(&store).await.role, Role::Unknown);

        ctx.cancel();
        assert!(handle.await.unwrap().is_ok());
    }
}
