//! # Event sinks.
//!
//! [`EventSink`] is where the flush loop writes and where the pruner reads.
//! [`StoreEventSink`] keeps one JSON document per record under
//! [`Keyspace::events`](crate::Keyspace::events).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::recorder::event::AggregatedEvent;
use crate::store::{Keyspace, StoreRef};

/// Persistence of aggregated events, keyed by [`AggregatedEvent::id`].
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Creates or replaces the record.
    async fn upsert(&self, event: &AggregatedEvent) -> Result<(), StoreError>;

    /// Lists every persisted record.
    async fn list(&self) -> Result<Vec<AggregatedEvent>, StoreError>;

    /// Deletes one record; deleting an absent record is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// [`EventSink`] on top of the coordination store.
pub struct StoreEventSink {
    store: StoreRef,
    keys: Keyspace,
}

impl StoreEventSink {
    pub fn new(store: StoreRef, keys: Keyspace) -> Self {
        Self { store, keys }
    }
}

#[async_trait]
impl EventSink for StoreEventSink {
    async fn upsert(&self, event: &AggregatedEvent) -> Result<(), StoreError> {
        let value = serde_json::to_vec(event)?;
        self.store
            .put(&self.keys.event(&event.id), value, None)
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AggregatedEvent>, StoreError> {
        let mut out = Vec::new();
        for kv in self.store.list(&self.keys.events()).await? {
            match serde_json::from_slice::<AggregatedEvent>(&kv.value) {
                Ok(ev) => out.push(ev),
                Err(e) => tracing::warn!(key = %kv.key, error = %e, "skipping undecodable event record"),
            }
        }
        Ok(out)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&self.keys.event(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CoordinationStore, MemoryStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_upsert_list_delete() {
        let store = MemoryStore::new();
        let sink = StoreEventSink::new(Arc::new(store.clone()), Keyspace::new("/t"));

        let mut e = AggregatedEvent::error_pipeline("p1", "boom").on_node("n1");
        e.id = "a@1".into();
        e.count = 1;
        sink.upsert(&e).await.unwrap();
        e.count = 2;
        sink.upsert(&e).await.unwrap();
        store.put("/t/events/junk", b"not json".to_vec(), None).await.unwrap();

        let all = sink.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].count, 2);

        sink.delete("a@1").await.unwrap();
        sink.delete("a@1").await.unwrap();
        assert!(sink.list().await.unwrap().is_empty());
    }
}
