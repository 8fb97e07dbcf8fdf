//! # EventRecorder: aggregate, buffer and flush operational events.
//!
//! [`EventRecorder::builder`] spawns two loops bound to one cancellation token:
//!
//! - **dispatch**: owns the LRU of aggregation keys. A hit whose window is still
//!   open bumps `count`/`last_time`; an expired hit is evicted and handled as a
//!   miss; a miss starts a record with `count = 1` and a fresh `id`. Every
//!   outcome is forwarded to the flush loop.
//! - **flush**: collapses updates into a pending map keyed by record `id`
//!   (last write wins) and writes the batch when it reaches the threshold or on
//!   each interval tick. A failed upsert drops that item only.
//!
//! On cancellation the dispatch loop stops accepting events, aggregates what
//! is already queued and exits; the flush loop follows once its channel is
//! drained and writes what is still pending.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::RecorderConfig;
use crate::error::StoreError;
use crate::events::{Bus, Event, EventKind};
use crate::recorder::clock::{Clock, SystemClock};
use crate::recorder::event::AggregatedEvent;
use crate::recorder::sink::EventSink;

/// Cloneable ingest handle of a running recorder.
#[derive(Clone)]
pub struct EventRecorder {
    ingest: mpsc::Sender<AggregatedEvent>,
}

impl EventRecorder {
    /// Starts configuring a recorder writing to `sink`.
    pub fn builder(sink: Arc<dyn EventSink>) -> EventRecorderBuilder {
        EventRecorderBuilder {
            sink,
            node_name: String::new(),
            clock: Arc::new(SystemClock),
            bus: None,
            cfg: RecorderConfig::default(),
        }
    }

    /// Enqueues one occurrence.
    ///
    /// Waits while the ingest queue is full. Fails with [`StoreError::Closed`]
    /// once the recorder loops have stopped.
    pub async fn event(&self, event: AggregatedEvent) -> Result<(), StoreError> {
        self.ingest
            .send(event)
            .await
            .map_err(|_| StoreError::Closed)
    }

    /// Enqueues one occurrence without waiting; returns `false` if the queue is full or closed.
    pub fn try_event(&self, event: AggregatedEvent) -> bool {
        self.ingest.try_send(event).is_ok()
    }

    /// True once both loops are gone.
    pub fn is_closed(&self) -> bool {
        self.ingest.is_closed()
    }
}

/// Configuration of an [`EventRecorder`] before its loops are spawned.
pub struct EventRecorderBuilder {
    sink: Arc<dyn EventSink>,
    node_name: String,
    clock: Arc<dyn Clock>,
    bus: Option<Bus>,
    cfg: RecorderConfig,
}

impl EventRecorderBuilder {
    /// Node name stamped on events that do not carry one.
    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bus receiving flush outcomes.
    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(mut self, cfg: RecorderConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Spawns the dispatch and flush loops under `ctx`.
    pub fn spawn(self, ctx: &CancellationToken) -> EventRecorder {
        let cfg = self.cfg;
        let bus = self.bus.unwrap_or_default();
        let (ingest_tx, ingest_rx) = mpsc::channel(cfg.ingest_capacity.max(1));
        let (flush_tx, flush_rx) = mpsc::channel(cfg.flush_capacity.max(1));

        let cache_capacity = NonZeroUsize::new(cfg.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let dispatcher = Dispatcher {
            cache: LruCache::new(cache_capacity),
            node_name: self.node_name,
            clock: self.clock,
            window: cfg.window,
        };
        let flusher = Flusher {
            sink: self.sink,
            bus,
            pending: HashMap::new(),
            threshold: cfg.flush_threshold.max(1),
        };

        tokio::spawn(dispatcher.run(ctx.clone(), ingest_rx, flush_tx));
        tokio::spawn(flusher.run(flush_rx, cfg.flush_interval));

        EventRecorder { ingest: ingest_tx }
    }
}

struct Dispatcher {
    cache: LruCache<String, AggregatedEvent>,
    node_name: String,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl Dispatcher {
    async fn run(
        mut self,
        ctx: CancellationToken,
        mut rx: mpsc::Receiver<AggregatedEvent>,
        flush: mpsc::Sender<AggregatedEvent>,
    ) {
        loop {
            let incoming = tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                incoming = rx.recv() => incoming,
            };
            let Some(event) = incoming else { return };
            if flush.send(self.aggregate(event)).await.is_err() {
                return;
            }
        }

        rx.close();
        while let Some(event) = rx.recv().await {
            if flush.send(self.aggregate(event)).await.is_err() {
                return;
            }
        }
    }

    fn aggregate(&mut self, mut event: AggregatedEvent) -> AggregatedEvent {
        if event.node_name.is_empty() {
            event.node_name.clone_from(&self.node_name);
        }
        let key = event.aggregation_key();
        let now = self.clock.now();

        if let Some(current) = self.cache.get_mut(&key) {
            if current.window_open(now, self.window) {
                current.count += 1;
                current.last_time = now;
                return current.clone();
            }
            self.cache.pop(&key);
        }

        event.count = 1;
        event.first_time = now;
        event.last_time = now;
        event.id = format!("{key}@{}", now.timestamp_millis());
        self.cache.put(key, event.clone());
        event
    }
}

struct Flusher {
    sink: Arc<dyn EventSink>,
    bus: Bus,
    pending: HashMap<String, AggregatedEvent>,
    threshold: usize,
}

impl Flusher {
    async fn run(mut self, mut rx: mpsc::Receiver<AggregatedEvent>, interval: Duration) {
        let mut tick = tokio::time::interval(interval.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;

        loop {
            tokio::select! {
                incoming = rx.recv() => match incoming {
                    Some(record) => {
                        self.pending.insert(record.id.clone(), record);
                        if self.pending.len() >= self.threshold {
                            self.flush().await;
                        }
                    }
                    None => break,
                },
                _ = tick.tick() => self.flush().await,
            }
        }
        self.flush().await;
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let mut written = 0u64;
        for (id, record) in batch {
            match self.sink.upsert(&record).await {
                Ok(()) => written += 1,
                Err(e) => self.bus.publish(
                    Event::new(EventKind::EventFlushFailed)
                        .with_component("event-recorder")
                        .with_key(id)
                        .with_reason(e.to_string()),
                ),
            }
        }
        self.bus.publish(
            Event::new(EventKind::EventsFlushed)
                .with_component("event-recorder")
                .with_count(written),
        );
    }
}
