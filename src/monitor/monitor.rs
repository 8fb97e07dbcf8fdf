//! # ClusterMonitor
//!
//! ```text
//! start(ctx) ─► SupervisionGroup(ctx)
//!                 ├─ WatchStream(nodes/)     ─► forwarder ─┐
//!                 ├─ WatchStream(pipelines/) ─► forwarder ─┼─► broadcast<ClusterChange>
//!                 └─ WatchStream(status/)    ─► forwarder ─┘
//!               group done ─► status = "stop"
//! ```
//!
//! `start` and `stop` are serialized by one async mutex; a generation counter
//! keeps a finished group from flipping the status of a newer run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfig;
use crate::error::ServiceError;
use crate::events::Bus;
use crate::monitor::change::{ChangeScope, ClusterChange};
use crate::store::{Keyspace, StoreRef};
use crate::supervision::{Service, ServiceStatus, SupervisionGroup};
use crate::watch::WatchStream;

const SCOPES: [ChangeScope; 3] = [ChangeScope::Node, ChangeScope::Pipeline, ChangeScope::Status];

struct Shared {
    running: AtomicBool,
    generation: AtomicU64,
}

/// Leader-only watcher of cluster records.
pub struct ClusterMonitor {
    watches: WatchStream,
    keys: Keyspace,
    bus: Bus,
    grace: Option<Duration>,
    changes: broadcast::Sender<ClusterChange>,
    group: Mutex<Option<Arc<SupervisionGroup>>>,
    shared: Arc<Shared>,
}

impl ClusterMonitor {
    pub fn new(store: StoreRef, keys: Keyspace, bus: Bus, cfg: &WatchConfig) -> Self {
        let (changes, _) = broadcast::channel(cfg.buffer.max(1));
        Self {
            watches: WatchStream::new(store, bus.clone(), cfg).named("cluster-monitor"),
            keys,
            bus,
            grace: Some(Duration::from_secs(5)),
            changes,
            group: Mutex::new(None),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Forwards changes into `changes` instead of a private channel, so that
    /// receivers outlive this instance.
    pub fn with_changes(mut self, changes: broadcast::Sender<ClusterChange>) -> Self {
        self.changes = changes;
        self
    }

    /// Receiver of forwarded changes; lagging receivers lose the oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterChange> {
        self.changes.subscribe()
    }

    async fn open(&self, group: &SupervisionGroup) -> Result<(), ServiceError> {
        for scope in SCOPES {
            let dir = scope.dir(&self.keys);
            let decode_dir = dir.clone();
            let mut rx = self
                .watches
                .start(&group.child_token(), &dir, move |ev| {
                    ClusterChange::decode(scope, &decode_dir, ev)
                })
                .await?;

            let liveness = CancellationToken::new();
            group.watch(format!("watch-{scope}"), liveness.clone());
            let changes = self.changes.clone();
            tokio::spawn(async move {
                while let Some(change) = rx.recv().await {
                    let _ = changes.send(change);
                }
                liveness.cancel();
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Service for ClusterMonitor {
    fn name(&self) -> &str {
        "cluster-monitor"
    }

    async fn start(&self, ctx: &CancellationToken) -> Result<(), ServiceError> {
        let mut current = self.group.lock().await;
        if self.shared.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let group = Arc::new(SupervisionGroup::new(ctx, self.bus.clone()));
        if let Err(e) = self.open(&group).await {
            group.cancel();
            return Err(e);
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.running.store(true, Ordering::Release);
        tokio::spawn({
            let group = Arc::clone(&group);
            let shared = Arc::clone(&self.shared);
            async move {
                group.done().await;
                if shared.generation.load(Ordering::Acquire) == generation {
                    shared.running.store(false, Ordering::Release);
                }
            }
        });
        *current = Some(group);
        Ok(())
    }

    async fn stop(&self) {
        let mut current = self.group.lock().await;
        let Some(group) = current.take() else {
            return;
        };
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.running.store(false, Ordering::Release);
        group.shutdown(self.grace).await;
    }

    fn status(&self) -> ServiceStatus {
        if self.shared.running.load(Ordering::Acquire) {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CoordinationStore, MemoryStore, WatchEventKind};

    fn monitor(store: &MemoryStore) -> ClusterMonitor {
        ClusterMonitor::new(
            Arc::new(store.clone()),
            Keyspace::new("/t"),
            Bus::new(64),
            &WatchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_forwards_changes_and_is_idempotent() {
        let store = MemoryStore::new();
        let mon = monitor(&store);
        let mut rx = mon.subscribe();
        let ctx = CancellationToken::new();
        assert_eq!(mon.status(), ServiceStatus::Stopped);

        mon.start(&ctx).await.unwrap();
        mon.start(&ctx).await.unwrap();
        assert_eq!(mon.status(), ServiceStatus::Running);
        assert_eq!(store.watch_count(), 3);

        store.put("/t/nodes/n1", br#"{"name":"n1"}"#.to_vec(), None).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.scope, ChangeScope::Node);
        assert_eq!(change.name, "n1");

        store.delete("/t/nodes/n1").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, WatchEventKind::Delete);

        mon.stop().await;
        mon.stop().await;
        assert_eq!(mon.status(), ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_ended_stream_stops_monitor_and_restart_works() {
        let store = MemoryStore::new();
        let mon = monitor(&store);
        let ctx = CancellationToken::new();

        mon.start(&ctx).await.unwrap();
        store.close_watches();
        while mon.status() == ServiceStatus::Running {
            tokio::task::yield_now().await;
        }

        mon.start(&ctx).await.unwrap();
        assert_eq!(mon.status(), ServiceStatus::Running);
        mon.stop().await;
        assert_eq!(mon.status(), ServiceStatus::Stopped);
    }
}
