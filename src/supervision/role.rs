//! # RoleSupervisor: leader-only subsystems follow the role.
//!
//! A single task owns every subsystem slot, so a role notification and the
//! periodic re-check can never evaluate concurrently.
//!
//! ```text
//! loop select:
//!   ctx cancelled       → stop all, exit
//!   roles.changed()     → evaluate(new role)      (sender gone → stop all, exit)
//!   recheck tick (3s)   → evaluate(last known role)
//!
//! evaluate(Leader):  per slot, absent or Stopped → build + start (failure: stay absent)
//! evaluate(other):   per slot, present → stop + clear
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::RoleConfig;
use crate::election::{Election, Role};
use crate::error::ServiceError;
use crate::events::{Bus, Event, EventKind};
use crate::supervision::service::{Service, ServiceStatus, TaskService};
use crate::tasks::TaskRef;

type Factory = dyn Fn() -> Result<Arc<dyn Service>, ServiceError> + Send + Sync;

/// A named leader-only subsystem and how to build a fresh instance of it.
#[derive(Clone)]
pub struct LeaderSlot {
    name: Arc<str>,
    factory: Arc<Factory>,
}

impl LeaderSlot {
    pub fn new<F>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Service>, ServiceError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Slot running a fresh task per leadership term.
    pub fn task<F>(name: impl Into<Arc<str>>, bus: Bus, make: F) -> Self
    where
        F: Fn() -> TaskRef + Send + Sync + 'static,
    {
        Self::new(name, move || {
            Ok(Arc::new(TaskService::new(make(), bus.clone())) as Arc<dyn Service>)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Owner of the leader-only subsystems of one node run.
pub struct RoleSupervisor {
    slots: Vec<LeaderSlot>,
    roles: watch::Receiver<Role>,
    cfg: RoleConfig,
    bus: Bus,
}

impl RoleSupervisor {
    pub fn new(roles: watch::Receiver<Role>, slots: Vec<LeaderSlot>, cfg: RoleConfig, bus: Bus) -> Self {
        Self {
            slots,
            roles,
            cfg,
            bus,
        }
    }

    /// Supervisor following `election`.
    pub fn for_election(election: &dyn Election, slots: Vec<LeaderSlot>, cfg: RoleConfig, bus: Bus) -> Self {
        Self::new(election.roles(), slots, cfg, bus)
    }

    pub fn spawn(self, ctx: &CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(ctx.clone()))
    }

    /// Runs the loop until `ctx` is cancelled or the role sender is dropped,
    /// then stops every running subsystem.
    pub async fn run(self, ctx: CancellationToken) {
        let RoleSupervisor {
            slots,
            mut roles,
            cfg,
            bus,
        } = self;
        let mut state = Slots {
            slots,
            running: Vec::new(),
            bus,
        };
        state.running.resize_with(state.slots.len(), || None);

        let mut recheck = tokio::time::interval(cfg.recheck_interval.max(std::time::Duration::from_millis(1)));
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                changed = roles.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let role = *roles.borrow_and_update();
                    state.evaluate(role, &ctx).await;
                }
                _ = recheck.tick() => {
                    let role = *roles.borrow();
                    state.evaluate(role, &ctx).await;
                }
            }
        }
        state.stop_all().await;
    }
}

struct Slots {
    slots: Vec<LeaderSlot>,
    running: Vec<Option<Arc<dyn Service>>>,
    bus: Bus,
}

impl Slots {
    async fn evaluate(&mut self, role: Role, ctx: &CancellationToken) {
        if role.is_leader() {
            self.start_missing(ctx).await;
        } else {
            self.stop_all().await;
        }
    }

    async fn start_missing(&mut self, ctx: &CancellationToken) {
        for (slot, current) in self.slots.iter().zip(self.running.iter_mut()) {
            if current
                .as_ref()
                .is_some_and(|svc| svc.status() == ServiceStatus::Running)
            {
                continue;
            }
            *current = None;

            let started = match (slot.factory)() {
                Ok(svc) => svc.start(ctx).await.map(|()| svc),
                Err(e) => Err(e),
            };
            match started {
                Ok(svc) => {
                    self.bus.publish(
                        Event::new(EventKind::SubsystemStarted)
                            .with_component(Arc::clone(&slot.name)),
                    );
                    *current = Some(svc);
                }
                Err(e) => self.bus.publish(
                    Event::new(EventKind::SubsystemStartFailed)
                        .with_component(Arc::clone(&slot.name))
                        .with_reason(e.to_string()),
                ),
            }
        }
    }

    async fn stop_all(&mut self) {
        for (slot, current) in self.slots.iter().zip(self.running.iter_mut()) {
            if let Some(svc) = current.take() {
                svc.stop().await;
                self.bus.publish(
                    Event::new(EventKind::SubsystemStopped).with_component(Arc::clone(&slot.name)),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        builds: AtomicUsize,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    struct Probe {
        counters: Arc<Counters>,
        status: Mutex<ServiceStatus>,
        fail_start: bool,
    }

    #[async_trait]
    impl Service for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        async fn start(&self, _ctx: &CancellationToken) -> Result<(), ServiceError> {
            if self.fail_start {
                return Err(ServiceError::Start {
                    service: "probe".into(),
                    error: "refused".into(),
                });
            }
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            *self.status.lock() = ServiceStatus::Running;
            Ok(())
        }

        async fn stop(&self) {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            *self.status.lock() = ServiceStatus::Stopped;
        }

        fn status(&self) -> ServiceStatus {
            *self.status.lock()
        }
    }

    fn slot(name: &'static str, counters: Arc<Counters>, fail_start: bool) -> LeaderSlot {
        LeaderSlot::new(name, move || {
            counters.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Probe {
                counters: counters.clone(),
                status: Mutex::new(ServiceStatus::Stopped),
                fail_start,
            }) as Arc<dyn Service>)
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_leader_starts_once() {
        let (tx, rx) = watch::channel(Role::Unknown);
        let counters = Arc::new(Counters::default());
        let ctx = CancellationToken::new();
        let handle = RoleSupervisor::new(
            rx,
            vec![slot("scheduler", counters.clone(), false)],
            RoleConfig::default(),
            Bus::new(64),
        )
        .spawn(&ctx);

        tx.send(Role::Leader).unwrap();
        settle().await;
        tx.send(Role::Leader).unwrap();
        settle().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

        tx.send(Role::Follower).unwrap();
        settle().await;
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);

        tx.send(Role::Follower).unwrap();
        settle().await;
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);

        ctx.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_does_not_block_others_and_is_retried() {
        let (tx, rx) = watch::channel(Role::Unknown);
        let failing = Arc::new(Counters::default());
        let healthy = Arc::new(Counters::default());
        let ctx = CancellationToken::new();
        RoleSupervisor::new(
            rx,
            vec![
                slot("cluster-monitor", failing.clone(), true),
                slot("event-manager", healthy.clone(), false),
            ],
            RoleConfig::default(),
            Bus::new(64),
        )
        .spawn(&ctx);

        tx.send(Role::Leader).unwrap();
        settle().await;
        assert_eq!(healthy.starts.load(Ordering::SeqCst), 1);
        let first_builds = failing.builds.load(Ordering::SeqCst);
        assert!(first_builds >= 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(failing.builds.load(Ordering::SeqCst) > first_builds);
        assert_eq!(healthy.starts.load(Ordering::SeqCst), 1);
        ctx.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_everything() {
        let (tx, rx) = watch::channel(Role::Leader);
        let counters = Arc::new(Counters::default());
        let handle = RoleSupervisor::new(
            rx,
            vec![slot("scheduler", counters.clone(), false)],
            RoleConfig::default(),
            Bus::new(64),
        )
        .spawn(&CancellationToken::new());

        settle().await;
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

        drop(tx);
        handle.await.unwrap();
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }
}
