//! # Node run, restart loop and signal handling.
//!
//! One [`Node::run`] is one membership term: fresh store connection, fresh
//! registration, election and managers. Whatever ends the term (parent
//! cancellation, a mandatory member exiting, a panic) tears every member down
//! before `run` returns.

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::election::{Election, LeaseElection, Role};
use crate::error::{NodeError, TaskError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::monitor::{ClusterChange, ClusterMonitor};
use crate::node::info::NodeInfo;
use crate::node::shutdown::wait_for_shutdown_signal;
use crate::node::status::StatusManager;
use crate::recorder::{AggregatedEvent, EventPruner, EventRecorder, EventSink, StoreEventSink};
use crate::registration::Registration;
use crate::store::{Connect, Keyspace, StoreRef};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::supervision::{LeaderSlot, RoleSupervisor, Service, SupervisionGroup};
use crate::tasks::{TaskFn, TaskRef};

/// Builder of a [`Node`].
pub struct NodeBuilder {
    name: String,
    connector: Arc<dyn Connect>,
    cfg: Config,
    bus: Option<Bus>,
    pipe_manager: Option<TaskRef>,
    leader_slots: Vec<LeaderSlot>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl NodeBuilder {
    pub fn config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Bus receiving lifecycle events; a fresh one is created otherwise.
    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Mandatory per-node task running the local pipelines.
    pub fn pipe_manager(mut self, task: TaskRef) -> Self {
        self.pipe_manager = Some(task);
        self
    }

    /// Adds an application leader-only subsystem (e.g. the scheduler).
    ///
    /// Application slots start before the built-in cluster monitor and event manager.
    pub fn leader_slot(mut self, slot: LeaderSlot) -> Self {
        self.leader_slots.push(slot);
        self
    }

    /// Adds a subscriber fed from the bus while [`Node::run_with_restart`] runs.
    pub fn subscriber(mut self, sub: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(sub);
        self
    }

    pub fn build(self) -> Node {
        let bus = self
            .bus
            .unwrap_or_else(|| Bus::new(self.cfg.bus_capacity));
        let pipe_manager = self.pipe_manager.unwrap_or_else(|| {
            TaskFn::arc("pipe-manager", |ctx: CancellationToken| async move {
                ctx.cancelled().await;
                Ok::<_, TaskError>(())
            })
        });
        let (changes, _) = broadcast::channel(self.cfg.watch.buffer.max(1));
        Node {
            keys: Keyspace::new(self.cfg.node.key_prefix.as_str()),
            name: self.name,
            connector: self.connector,
            cfg: self.cfg,
            bus,
            pipe_manager,
            leader_slots: self.leader_slots,
            subscribers: self.subscribers,
            changes,
            info: Mutex::new(None),
            roles: Mutex::new(None),
            recorder: Mutex::new(None),
        }
    }
}

/// A cluster member.
pub struct Node {
    name: String,
    connector: Arc<dyn Connect>,
    keys: Keyspace,
    cfg: Config,
    bus: Bus,
    pipe_manager: TaskRef,
    leader_slots: Vec<LeaderSlot>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    changes: broadcast::Sender<ClusterChange>,
    info: Mutex<Option<NodeInfo>>,
    roles: Mutex<Option<watch::Receiver<Role>>>,
    recorder: Mutex<Option<EventRecorder>>,
}

impl Node {
    pub fn builder(name: impl Into<String>, connector: Arc<dyn Connect>) -> NodeBuilder {
        NodeBuilder {
            name: name.into(),
            connector,
            cfg: Config::default(),
            bus: None,
            pipe_manager: None,
            leader_slots: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &Keyspace {
        &self.keys
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Role published by the election of the current run; `Unknown` outside a run.
    pub fn role(&self) -> Role {
        self.roles
            .lock()
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or_default()
    }

    /// Node record as last read from the store.
    pub fn info(&self) -> Option<NodeInfo> {
        self.info.lock().clone()
    }

    /// Event recorder of the current run.
    pub fn recorder(&self) -> Option<EventRecorder> {
        self.recorder.lock().clone()
    }

    /// Changes forwarded by the cluster monitor while this node leads.
    pub fn cluster_changes(&self) -> broadcast::Receiver<ClusterChange> {
        self.changes.subscribe()
    }

    async fn refresh(&self, store: &StoreRef) -> Result<NodeInfo, NodeError> {
        let Some(kv) = store.get(&self.keys.node(&self.name)).await? else {
            return Err(NodeError::MissingNode {
                name: self.name.clone(),
            });
        };
        let info: NodeInfo = serde_json::from_slice(&kv.value).map_err(|e| NodeError::Decode {
            name: self.name.clone(),
            error: e.to_string(),
        })?;
        *self.info.lock() = Some(info.clone());
        Ok(info)
    }

    fn built_in_slots(&self, store: &StoreRef, sink: Arc<dyn EventSink>) -> Vec<LeaderSlot> {
        let mut slots = self.leader_slots.clone();

        let (store, keys, bus) = (store.clone(), self.keys.clone(), self.bus.clone());
        let (watch_cfg, changes) = (self.cfg.watch.clone(), self.changes.clone());
        slots.push(LeaderSlot::new("cluster-monitor", move || {
            let monitor = ClusterMonitor::new(store.clone(), keys.clone(), bus.clone(), &watch_cfg)
                .with_changes(changes.clone());
            Ok(Arc::new(monitor) as Arc<dyn Service>)
        }));

        let (bus, recorder_cfg) = (self.bus.clone(), self.cfg.recorder.clone());
        slots.push(LeaderSlot::task("event-manager", self.bus.clone(), move || {
            Arc::new(EventPruner::new(sink.clone(), bus.clone(), &recorder_cfg)) as TaskRef
        }));
        slots
    }

    /// Runs one membership term until `ctx` is cancelled or a mandatory member ends.
    ///
    /// Returns `Ok(())` only when `ctx` was cancelled. Panics inside the run are
    /// contained and returned as [`NodeError::Panicked`].
    pub async fn run(&self, ctx: &CancellationToken) -> Result<(), NodeError> {
        match std::panic::AssertUnwindSafe(self.run_term(ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let info = panic_message(&*panic);
                self.bus.publish(
                    Event::new(EventKind::Panicked)
                        .with_component("node")
                        .with_key(self.name.as_str())
                        .with_reason(info.as_str()),
                );
                Err(NodeError::Panicked { info })
            }
        }
    }

    async fn run_term(&self, ctx: &CancellationToken) -> Result<(), NodeError> {
        let store = self.connector.connect().await?;
        let info = self.refresh(&store).await?;
        let payload = serde_json::to_vec(&info).map_err(crate::error::StoreError::from)?;

        let scope = ctx.child_token();
        let _teardown = scope.clone().drop_guard();

        let sink: Arc<dyn EventSink> = Arc::new(StoreEventSink::new(store.clone(), self.keys.clone()));
        let recorder = EventRecorder::builder(Arc::clone(&sink))
            .node_name(self.name.as_str())
            .bus(self.bus.clone())
            .config(self.cfg.recorder.clone())
            .spawn(&scope);
        *self.recorder.lock() = Some(recorder.clone());

        let group = SupervisionGroup::new(&scope, self.bus.clone());

        let registration = Arc::new(Registration::new(
            Arc::clone(&self.connector),
            self.keys.registration(&self.name),
            payload.clone(),
            self.cfg.registration.clone(),
            self.bus.clone(),
        ));
        group.watch("registration", registration.run(&group.token()));

        let election = Arc::new(LeaseElection::new(
            Arc::clone(&self.connector),
            &self.keys,
            payload,
            self.cfg.registration.clone(),
            self.cfg.node.election_retry,
            self.bus.clone(),
        ));
        *self.roles.lock() = Some(election.roles());
        group.spawn(election.clone());
        group.spawn(Arc::clone(&self.pipe_manager));
        group.spawn(Arc::new(StatusManager::new(
            store.clone(),
            &self.keys,
            self.name.as_str(),
            election.roles(),
            self.cfg.node.status_interval,
        )));

        let leader = RoleSupervisor::for_election(
            election.as_ref(),
            self.built_in_slots(&store, sink),
            self.cfg.role.clone(),
            self.bus.clone(),
        )
        .spawn(&scope);

        self.bus.publish(
            Event::new(EventKind::NodeStarted)
                .with_component("node")
                .with_key(self.name.as_str()),
        );

        group.done().await;
        let result = if ctx.is_cancelled() {
            Ok(())
        } else {
            Err(NodeError::MemberExited {
                member: group
                    .exited_member()
                    .unwrap_or_else(|| "unknown".to_string()),
            })
        };
        if let Err(e) = &result {
            recorder.try_event(AggregatedEvent::error_node(self.name.as_str(), e.to_string()));
        }

        scope.cancel();
        let grace = self.cfg.node.grace();
        group.shutdown(grace).await;
        if let Some(grace) = grace {
            let _ = tokio::time::timeout(grace, leader).await;
        }

        let mut stopped = Event::new(EventKind::NodeStopped)
            .with_component("node")
            .with_key(self.name.as_str());
        if let Err(e) = &result {
            stopped = stopped.with_reason(e.to_string());
        }
        self.bus.publish(stopped);
        result
    }

    /// Runs terms back to back until `ctx` is cancelled.
    ///
    /// Waits `cfg.node.restart.next(attempt)` between terms; the attempt counter
    /// resets after a term that lasted at least one fencing interval. Registered
    /// subscribers receive bus events for the whole loop.
    pub async fn run_with_restart(&self, ctx: &CancellationToken) {
        let stop = CancellationToken::new();
        let listener = (!self.subscribers.is_empty()).then(|| {
            Arc::new(SubscriberSet::new(self.subscribers.clone(), self.bus.clone())).listen(stop.clone())
        });

        self.restart_loop(ctx).await;

        stop.cancel();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
    }

    async fn restart_loop(&self, ctx: &CancellationToken) {
        let mut attempt = 0u32;
        loop {
            let started = Instant::now();
            let result = self.run(ctx).await;
            if ctx.is_cancelled() {
                return;
            }
            if started.elapsed() >= self.cfg.registration.fencing_interval {
                attempt = 0;
            }

            let delay = self.cfg.node.restart.next(attempt);
            attempt = attempt.saturating_add(1);
            let mut ev = Event::new(EventKind::RestartScheduled)
                .with_component("node")
                .with_key(self.name.as_str())
                .with_delay(delay)
                .with_attempt(attempt);
            if let Err(e) = &result {
                ev = ev.with_reason(e.to_string());
            }
            self.bus.publish(ev);

            tokio::select! {
                _ = ctx.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Runs with restart until the process receives a termination signal.
    pub async fn run_until_signal(&self) -> std::io::Result<()> {
        let ctx = CancellationToken::new();
        let signal = {
            let ctx = ctx.clone();
            async move {
                let received = wait_for_shutdown_signal().await;
                ctx.cancel();
                received
            }
        };
        let (received, ()) = tokio::join!(signal, self.run_with_restart(&ctx));
        received
    }
}
