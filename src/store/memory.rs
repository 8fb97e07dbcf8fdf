//! # MemoryStore: in-process coordination store.
//!
//! A single-process implementation of [`CoordinationStore`] with etcd-like
//! semantics:
//! - one global revision counter, bumped by every write and delete;
//! - `create_revision` fixed at creation, `mod_revision` bumped on each write;
//! - leases with TTL, renewed by [`keep_alive_once`](CoordinationStore::keep_alive_once);
//!   keys bound to a lease are deleted when it expires or is revoked;
//! - prefix watches fed from every mutation.
//!
//! ## Rules
//! - Lease expiry is evaluated lazily at the start of every operation (no reaper task).
//! - Time is read from [`tokio::time::Instant`], so paused-clock tests drive TTLs.
//! - Cloning shares the underlying state; [`Connect`] hands out such clones.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::store::store::{
    Connect, CoordinationStore, KeyValue, LeaseId, PutOutcome, StoreRef, WatchEvent,
    WatchEventKind, WatchEvents,
};

struct Lease {
    ttl: Duration,
    deadline: Instant,
    keys: BTreeSet<String>,
}

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct Inner {
    revision: i64,
    next_lease: LeaseId,
    kvs: BTreeMap<String, KeyValue>,
    leases: HashMap<LeaseId, Lease>,
    watchers: Vec<Watcher>,
}

impl Inner {
    fn expire(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, l)| l.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.drop_lease(id);
        }
    }

    fn drop_lease(&mut self, id: LeaseId) -> bool {
        let Some(lease) = self.leases.remove(&id) else {
            return false;
        };
        for key in lease.keys {
            self.delete_key(&key);
        }
        true
    }

    fn delete_key(&mut self, key: &str) -> bool {
        let Some(kv) = self.kvs.remove(key) else {
            return false;
        };
        if let Some(lease) = kv.lease.and_then(|id| self.leases.get_mut(&id)) {
            lease.keys.remove(key);
        }
        self.revision += 1;
        let ev = WatchEvent {
            kind: WatchEventKind::Delete,
            key: key.to_string(),
            value: Vec::new(),
            revision: self.revision,
        };
        self.notify(ev);
        true
    }

    fn put_key(
        &mut self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> Result<i64, StoreError> {
        if let Some(id) = lease {
            if !self.leases.contains_key(&id) {
                return Err(StoreError::LeaseNotFound { lease: id });
            }
        }
        self.revision += 1;
        let revision = self.revision;

        let create_revision = match self.kvs.get(key) {
            Some(old) => {
                if let Some(prev) = old.lease.filter(|prev| Some(*prev) != lease) {
                    if let Some(l) = self.leases.get_mut(&prev) {
                        l.keys.remove(key);
                    }
                }
                old.create_revision
            }
            None => revision,
        };
        if let Some(l) = lease.and_then(|id| self.leases.get_mut(&id)) {
            l.keys.insert(key.to_string());
        }

        self.kvs.insert(
            key.to_string(),
            KeyValue {
                key: key.to_string(),
                value: value.clone(),
                create_revision,
                mod_revision: revision,
                lease,
            },
        );
        self.notify(WatchEvent {
            kind: WatchEventKind::Put,
            key: key.to_string(),
            value,
            revision,
        });
        Ok(revision)
    }

    fn notify(&mut self, ev: WatchEvent) {
        self.watchers.retain(|w| {
            if ev.key.starts_with(&w.prefix) {
                w.tx.send(ev.clone()).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
    }
}

/// In-process [`CoordinationStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store at revision 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current global revision.
    pub fn revision(&self) -> i64 {
        self.inner.lock().revision
    }

    /// True while `lease` is granted and not expired.
    pub fn lease_alive(&self, lease: LeaseId) -> bool {
        let mut inner = self.inner.lock();
        inner.expire(Instant::now());
        inner.leases.contains_key(&lease)
    }

    /// Ends every open watch stream, as a server-initiated close would.
    pub fn close_watches(&self) {
        self.inner.lock().watchers.clear();
    }

    /// Number of open watch streams.
    pub fn watch_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    fn locked(&self) -> parking_lot::MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock();
        inner.expire(Instant::now());
        inner
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId, StoreError> {
        if ttl_secs <= 0 {
            return Err(StoreError::Backend {
                error: format!("invalid lease ttl {ttl_secs}"),
            });
        }
        let ttl = Duration::from_secs(ttl_secs as u64);
        let mut inner = self.locked();
        inner.next_lease += 1;
        let id = inner.next_lease;
        inner.leases.insert(
            id,
            Lease {
                ttl,
                deadline: Instant::now() + ttl,
                keys: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    async fn keep_alive_once(&self, lease: LeaseId) -> Result<(), StoreError> {
        let mut inner = self.locked();
        match inner.leases.get_mut(&lease) {
            Some(l) => {
                l.deadline = Instant::now() + l.ttl;
                Ok(())
            }
            None => Err(StoreError::LeaseNotFound { lease }),
        }
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        if self.locked().drop_lease(lease) {
            Ok(())
        } else {
            Err(StoreError::LeaseNotFound { lease })
        }
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: LeaseId,
    ) -> Result<PutOutcome, StoreError> {
        let mut inner = self.locked();
        if let Some(kv) = inner.kvs.get(key) {
            return Ok(PutOutcome::Exists {
                create_revision: kv.create_revision,
            });
        }
        let revision = inner.put_key(key, value, Some(lease))?;
        Ok(PutOutcome::Created { revision })
    }

    async fn get(&self, key: &str) -> Result<Option<KeyValue>, StoreError> {
        Ok(self.locked().kvs.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> Result<i64, StoreError> {
        self.locked().put_key(key, value, lease)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.locked().delete_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        let inner = self.locked();
        Ok(inner
            .kvs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, kv)| kv.clone())
            .collect())
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchEvents, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.locked().watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|ev| (Ok(ev), rx))
        });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl Connect for MemoryStore {
    async fn connect(&self) -> Result<StoreRef, StoreError> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_if_absent_is_exclusive() {
        let store = MemoryStore::new();
        let l1 = store.grant_lease(5).await.unwrap();
        let l2 = store.grant_lease(5).await.unwrap();

        let first = store.put_if_absent("/k", b"a".to_vec(), l1).await.unwrap();
        let second = store.put_if_absent("/k", b"b".to_vec(), l2).await.unwrap();

        let PutOutcome::Created { revision } = first else {
            panic!("first claim must win: {first:?}");
        };
        assert_eq!(second, PutOutcome::Exists { create_revision: revision });
        let kv = store.get("/k").await.unwrap().unwrap();
        assert_eq!(kv.value, b"a".to_vec());
        assert_eq!(kv.lease, Some(l1));
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..16u8 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                let lease = s.grant_lease(5).await.unwrap();
                s.put_if_absent("/race", vec![i], lease).await.unwrap()
            }));
        }
        let mut created = 0;
        for h in handles {
            if matches!(h.await.unwrap(), PutOutcome::Created { .. }) {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_deletes_keys() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(5).await.unwrap();
        store.put_if_absent("/k", vec![1], lease).await.unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        store.keep_alive_once(lease).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(store.get("/k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.get("/k").await.unwrap().is_none());
        let err = store.keep_alive_once(lease).await.unwrap_err();
        assert!(err.is_lease_not_found());
    }

    #[tokio::test]
    async fn test_create_revision_is_stable_across_writes() {
        let store = MemoryStore::new();
        let r1 = store.put("/k", vec![1], None).await.unwrap();
        let r2 = store.put("/k", vec![2], None).await.unwrap();
        let kv = store.get("/k").await.unwrap().unwrap();
        assert_eq!(kv.create_revision, r1);
        assert_eq!(kv.mod_revision, r2);

        store.delete("/k").await.unwrap();
        let r3 = store.put("/k", vec![3], None).await.unwrap();
        assert_eq!(store.get("/k").await.unwrap().unwrap().create_revision, r3);
    }

    #[tokio::test]
    async fn test_watch_prefix_and_close() {
        let store = MemoryStore::new();
        let mut events = store.watch_prefix("/a/").await.unwrap();

        store.put("/a/1", b"x".to_vec(), None).await.unwrap();
        store.put("/b/1", b"y".to_vec(), None).await.unwrap();
        store.delete("/a/1").await.unwrap();

        let put = events.next().await.unwrap().unwrap();
        assert_eq!(put.kind, WatchEventKind::Put);
        assert_eq!(put.value, b"x".to_vec());
        let del = events.next().await.unwrap().unwrap();
        assert_eq!(del.kind, WatchEventKind::Delete);
        assert_eq!(del.key, "/a/1");

        store.close_watches();
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_revoke_removes_keys_and_list_by_prefix() {
        let store = MemoryStore::new();
        let lease = store.grant_lease(5).await.unwrap();
        store.put("/p/1", vec![], Some(lease)).await.unwrap();
        store.put("/p/2", vec![], None).await.unwrap();
        store.put("/q/1", vec![], None).await.unwrap();

        let keys: Vec<String> = store.list("/p/").await.unwrap().into_iter().map(|kv| kv.key).collect();
        assert_eq!(keys, vec!["/p/1".to_string(), "/p/2".to_string()]);

        store.revoke_lease(lease).await.unwrap();
        assert_eq!(store.list("/p/").await.unwrap().len(), 1);
        assert!(!store.lease_alive(lease));
    }
}
