//! # WatchStream: raw store notifications → typed, buffered channel.
//!
//! ```text
//! store.watch_prefix(prefix) ──► forwarder task ──► decode(&WatchEvent)
//!                                                     ├─ Ok(Some(e)) → tx.send(e)   (bounded, blocks when full)
//!                                                     ├─ Ok(None)    → ignored
//!                                                     └─ Err(_)      → WatchItemSkipped, continue
//! ```
//!
//! ## Rules
//! - The output channel closes when the store ends the watch, when `ctx` is
//!   cancelled, or when the receiver is dropped; closure means "no further events".
//! - A decode error affects only that notification.
//! - No reconnect: callers needing resilience call [`WatchStream::start`] again.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfig;
use crate::error::StoreError;
use crate::events::{Bus, Event, EventKind};
use crate::store::{StoreRef, WatchEvent};

/// Factory of typed prefix watches over one store connection.
#[derive(Clone)]
pub struct WatchStream {
    store: StoreRef,
    bus: Bus,
    buffer: usize,
    component: Arc<str>,
}

impl WatchStream {
    pub fn new(store: StoreRef, bus: Bus, cfg: &WatchConfig) -> Self {
        Self {
            store,
            bus,
            buffer: cfg.buffer.max(1),
            component: Arc::from("watch"),
        }
    }

    /// Sets the component name used in published events.
    pub fn named(mut self, component: impl Into<Arc<str>>) -> Self {
        self.component = component.into();
        self
    }

    /// Opens a watch on `prefix` and returns the typed receiver.
    ///
    /// Fails only if the store refuses to open the watch.
    pub async fn start<E, D>(
        &self,
        ctx: &CancellationToken,
        prefix: &str,
        decode: D,
    ) -> Result<mpsc::Receiver<E>, StoreError>
    where
        E: Send + 'static,
        D: Fn(&WatchEvent) -> Result<Option<E>, StoreError> + Send + 'static,
    {
        let mut events = self.store.watch_prefix(prefix).await?;
        let (tx, rx) = mpsc::channel(self.buffer);

        let ctx = ctx.clone();
        let bus = self.bus.clone();
        let component = Arc::clone(&self.component);
        let prefix: Arc<str> = Arc::from(prefix);

        tokio::spawn(async move {
            let reason = loop {
                let item = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break "cancelled",
                    item = events.next() => item,
                };
                let ev = match item {
                    None => break "closed by store",
                    Some(Err(e)) => {
                        bus.publish(
                            Event::new(EventKind::WatchItemSkipped)
                                .with_component(Arc::clone(&component))
                                .with_key(Arc::clone(&prefix))
                                .with_reason(e.to_string()),
                        );
                        continue;
                    }
                    Some(Ok(ev)) => ev,
                };
                let value = match decode(&ev) {
                    Ok(Some(value)) => value,
                    Ok(None) => continue,
                    Err(e) => {
                        bus.publish(
                            Event::new(EventKind::WatchItemSkipped)
                                .with_component(Arc::clone(&component))
                                .with_key(ev.key.as_str())
                                .with_reason(e.to_string()),
                        );
                        continue;
                    }
                };
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break "cancelled",
                    sent = tx.send(value) => {
                        if sent.is_err() {
                            break "receiver dropped";
                        }
                    }
                }
            };
            bus.publish(
                Event::new(EventKind::WatchEnded)
                    .with_component(component)
                    .with_key(prefix)
                    .with_reason(reason),
            );
        });

        Ok(rx)
    }
}
