//! Store doubles shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{
    Connect, CoordinationStore, KeyValue, LeaseId, MemoryStore, PutOutcome, StoreRef, WatchEvents,
};

/// Store whose reads panic; everything else goes to the inner store.
#[derive(Clone)]
pub(crate) struct PanickingReads(pub(crate) MemoryStore);

#[async_trait]
impl CoordinationStore for PanickingReads {
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId, StoreError> {
        self.0.grant_lease(ttl_secs).await
    }

    async fn keep_alive_once(&self, lease: LeaseId) -> Result<(), StoreError> {
        self.0.keep_alive_once(lease).await
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        self.0.revoke_lease(lease).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: LeaseId,
    ) -> Result<PutOutcome, StoreError> {
        self.0.put_if_absent(key, value, lease).await
    }

    async fn get(&self, key: &str) -> Result<Option<KeyValue>, StoreError> {
        panic!("corrupted read of {key}");
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> Result<i64, StoreError> {
        self.0.put(key, value, lease).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.0.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        self.0.list(prefix).await
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchEvents, StoreError> {
        self.0.watch_prefix(prefix).await
    }
}

#[async_trait]
impl Connect for PanickingReads {
    async fn connect(&self) -> Result<StoreRef, StoreError> {
        Ok(Arc::new(self.clone()))
    }
}
