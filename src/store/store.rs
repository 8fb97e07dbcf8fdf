//! # Store contract.
//!
//! [`CoordinationStore`] is the narrow surface the runtime consumes. It is
//! object-safe and shared as [`StoreRef`] (`Arc<dyn CoordinationStore>`).
//! [`Connect`] opens a fresh handle; components that must not share a
//! connection with anything else (e.g. [`Registration`](crate::Registration))
//! call it themselves.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;

/// Opaque lease handle issued by the store.
pub type LeaseId = i64;

/// Shared handle to a store connection.
pub type StoreRef = Arc<dyn CoordinationStore>;

/// Stream of change notifications returned by [`CoordinationStore::watch_prefix`].
///
/// The stream ends when the store closes the watch.
pub type WatchEvents = BoxStream<'static, Result<WatchEvent, StoreError>>;

/// One stored key with its revision metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Store revision at which the key was created (immutable while it exists).
    pub create_revision: i64,
    /// Store revision of the last write.
    pub mod_revision: i64,
    /// Lease the key is bound to, if any.
    pub lease: Option<LeaseId>,
}

/// Result of [`CoordinationStore::put_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was created at `revision`.
    Created { revision: i64 },
    /// The key already existed; nothing was written.
    Exists { create_revision: i64 },
}

/// Kind of a watched change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Put,
    Delete,
}

/// One change notification delivered by a prefix watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,
    /// Raw payload; empty for deletes.
    pub value: Vec<u8>,
    /// Store revision of the change.
    pub revision: i64,
}

/// Consistent key-value store with leases and prefix watches.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Grants a lease that expires `ttl_secs` after the last keepalive.
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId, StoreError>;

    /// Renews the lease once.
    ///
    /// Fails with [`StoreError::LeaseNotFound`] when the lease expired or was revoked.
    async fn keep_alive_once(&self, lease: LeaseId) -> Result<(), StoreError>;

    /// Revokes the lease and deletes every key bound to it.
    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError>;

    /// Writes `key` bound to `lease` only if `key` does not exist.
    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: LeaseId,
    ) -> Result<PutOutcome, StoreError>;

    /// Reads one key.
    async fn get(&self, key: &str) -> Result<Option<KeyValue>, StoreError>;

    /// Unconditional write; returns the new store revision.
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> Result<i64, StoreError>;

    /// Deletes one key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Lists every key under `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError>;

    /// Watches every key under `prefix` for changes made after the call.
    async fn watch_prefix(&self, prefix: &str) -> Result<WatchEvents, StoreError>;
}

/// Opens store connections.
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    /// Opens a new connection.
    async fn connect(&self) -> Result<StoreRef, StoreError>;
}
