//! # EventPruner: deletes aggregated events past retention.
//!
//! Runs as a leader-only task: one pass per `prune_interval`, deleting records
//! whose `last_time + retention` is in the past. A failed delete is reported
//! and skipped; a failed listing ends the run so the leader machinery restarts
//! it on its next re-check.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::RecorderConfig;
use crate::error::{StoreError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::recorder::clock::{Clock, SystemClock};
use crate::recorder::sink::EventSink;
use crate::tasks::Task;

pub struct EventPruner {
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    bus: Bus,
    retention: Option<Duration>,
    interval: Duration,
}

impl EventPruner {
    pub fn new(sink: Arc<dyn EventSink>, bus: Bus, cfg: &RecorderConfig) -> Self {
        Self {
            sink,
            clock: Arc::new(SystemClock),
            bus,
            retention: cfg.retention(),
            interval: cfg.prune_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one pruning pass and returns how many records were deleted.
    pub async fn prune_once(&self) -> Result<u64, StoreError> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let Ok(retention) = TimeDelta::from_std(retention) else {
            return Ok(0);
        };
        let now = self.clock.now();

        let mut deleted = 0u64;
        for record in self.sink.list().await? {
            let expired = record
                .last_time
                .checked_add_signed(retention)
                .is_some_and(|end| end < now);
            if !expired {
                continue;
            }
            match self.sink.delete(&record.id).await {
                Ok(()) => deleted += 1,
                Err(e) => self.bus.publish(
                    Event::new(EventKind::EventPruneFailed)
                        .with_component("event-pruner")
                        .with_key(record.id)
                        .with_reason(e.to_string()),
                ),
            }
        }
        if deleted > 0 {
            self.bus.publish(
                Event::new(EventKind::EventsPruned)
                    .with_component("event-pruner")
                    .with_count(deleted),
            );
        }
        Ok(deleted)
    }
}

#[async_trait]
impl Task for EventPruner {
    fn name(&self) -> &str {
        "event-pruner"
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        if self.retention.is_none() {
            ctx.cancelled().await;
            return Ok(());
        }
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                _ = tick.tick() => {
                    self.prune_once().await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{AggregatedEvent, ManualClock, StoreEventSink};
    use crate::store::{Keyspace, MemoryStore};
    use chrono::{TimeZone, Utc};

    fn record(id: &str, last: chrono::DateTime<Utc>) -> AggregatedEvent {
        let mut e = AggregatedEvent::error_pipeline(id, "boom").on_node("n1");
        e.id = id.to_string();
        e.count = 1;
        e.first_time = last;
        e.last_time = last;
        e
    }

    #[tokio::test]
    async fn test_prunes_only_expired_records() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let sink = Arc::new(StoreEventSink::new(
            Arc::new(MemoryStore::new()),
            Keyspace::new("/t"),
        ));
        sink.upsert(&record("old", start - TimeDelta::hours(25)))
            .await
            .unwrap();
        sink.upsert(&record("edge", start - TimeDelta::hours(24)))
            .await
            .unwrap();
        sink.upsert(&record("fresh", start - TimeDelta::minutes(1)))
            .await
            .unwrap();

        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let pruner = EventPruner::new(sink.clone(), bus, &RecorderConfig::default())
            .with_clock(clock);

        assert_eq!(pruner.prune_once().await.unwrap(), 1);
        let mut left: Vec<_> = sink.list().await.unwrap().into_iter().map(|e| e.id).collect();
        left.sort();
        assert_eq!(left, vec!["edge".to_string(), "fresh".to_string()]);

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::EventsPruned);
        assert_eq!(ev.count, Some(1));
    }

    #[tokio::test]
    async fn test_disabled_retention_waits_for_cancel() {
        let sink = Arc::new(StoreEventSink::new(
            Arc::new(MemoryStore::new()),
            Keyspace::new("/t"),
        ));
        let cfg = RecorderConfig {
            retention: Duration::ZERO,
            ..RecorderConfig::default()
        };
        let pruner = EventPruner::new(sink, Bus::new(8), &cfg);
        let ctx = CancellationToken::new();
        ctx.cancel();
        assert!(pruner.run(ctx).await.is_ok());
        assert_eq!(pruner.prune_once().await.unwrap(), 0);
    }

    struct StuckSink(Vec<AggregatedEvent>);

    #[async_trait]
    impl EventSink for StuckSink {
        async fn upsert(&self, _event: &AggregatedEvent) -> Result<(), StoreError> {
            Ok(())
        }
        async fn list(&self) -> Result<Vec<AggregatedEvent>, StoreError> {
            Ok(self.0.clone())
        }
        async fn delete(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend {
                error: "read-only".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_delete_is_reported_as_prune_failure() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let sink = Arc::new(StuckSink(vec![record("old", start - TimeDelta::hours(48))]));
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let pruner = EventPruner::new(sink, bus, &RecorderConfig::default())
            .with_clock(Arc::new(ManualClock::new(start)));

        assert_eq!(pruner.prune_once().await.unwrap(), 0);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::EventPruneFailed);
        assert_eq!(ev.key.as_deref(), Some("old"));
        assert!(rx.try_recv().is_err());
    }
}
