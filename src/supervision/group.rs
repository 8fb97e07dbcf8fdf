//! # SupervisionGroup: one cancellation scope, many members.
//!
//! ```text
//! parent ──► group token ──► member ctx (child tokens)
//!                ▲
//!                │ cancel on first fire
//!   monitor(member A liveness) ── monitor(member B liveness) ── ...
//! ```
//!
//! One monitoring task per member waits for either the group token or the
//! member's liveness token. The first member to fire is recorded and cancels
//! the group. Adding members never requires touching a hand-written select.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::panic_message;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::TaskRef;

/// Fail-fast fan-in over member liveness signals.
pub struct SupervisionGroup {
    token: CancellationToken,
    bus: Bus,
    exited: Arc<Mutex<Option<String>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SupervisionGroup {
    /// Creates a group whose scope is a child of `parent`.
    pub fn new(parent: &CancellationToken, bus: Bus) -> Self {
        Self {
            token: parent.child_token(),
            bus,
            exited: Arc::new(Mutex::new(None)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The group scope; cancelled when the group is done.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A fresh member context derived from the group scope.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Adds a member represented only by its liveness token.
    pub fn watch(&self, name: impl Into<String>, liveness: CancellationToken) {
        self.monitor(name.into(), liveness, Arc::new(Mutex::new(None)));
    }

    /// Runs `task` as a member and returns its liveness token.
    ///
    /// The task gets a child of the group scope. Its return, error or panic
    /// fires the liveness token and therefore ends the group.
    pub fn spawn(&self, task: TaskRef) -> CancellationToken {
        let name = task.name().to_string();
        let ctx = self.child_token();
        let liveness = CancellationToken::new();
        let reason = Arc::new(Mutex::new(None));

        let handle = tokio::spawn({
            let liveness = liveness.clone();
            let reason = Arc::clone(&reason);
            let bus = self.bus.clone();
            let name = name.clone();
            async move {
                let outcome = std::panic::AssertUnwindSafe(task.run(ctx))
                    .catch_unwind()
                    .await;
                let why = match outcome {
                    Ok(Ok(())) => "returned".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(panic) => {
                        let info = panic_message(&*panic);
                        bus.publish(
                            Event::new(EventKind::Panicked)
                                .with_component(name.as_str())
                                .with_reason(info.as_str()),
                        );
                        format!("panicked: {info}")
                    }
                };
                *reason.lock() = Some(why);
                liveness.cancel();
            }
        });
        self.handles.lock().push(handle);

        self.monitor(name, liveness.clone(), reason);
        liveness
    }

    fn monitor(&self, name: String, liveness: CancellationToken, reason: Arc<Mutex<Option<String>>>) {
        let group = self.token.clone();
        let exited = Arc::clone(&self.exited);
        let bus = self.bus.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = group.cancelled() => return,
                _ = liveness.cancelled() => {}
            }
            {
                let mut first = exited.lock();
                if first.is_none() && !group.is_cancelled() {
                    *first = Some(name.clone());
                }
            }
            let why = reason
                .lock()
                .take()
                .unwrap_or_else(|| "liveness signal fired".to_string());
            bus.publish(
                Event::new(EventKind::MemberExited)
                    .with_component(name)
                    .with_reason(why),
            );
            group.cancel();
        });
    }

    /// Completes when the group is done.
    pub async fn done(&self) {
        self.token.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Name of the first member whose liveness fired before the group was cancelled.
    pub fn exited_member(&self) -> Option<String> {
        self.exited.lock().clone()
    }

    /// Cancels the group and waits for spawned members, up to `grace` if set.
    pub async fn shutdown(&self, grace: Option<Duration>) {
        self.cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        let join = futures::future::join_all(handles);
        match grace {
            Some(grace) => {
                let _ = tokio::time::timeout(grace, join).await;
            }
            None => drop(join),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::tasks::TaskFn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn waiting(name: &'static str, cancelled: Arc<AtomicUsize>) -> TaskRef {
        TaskFn::arc(name, move |ctx: CancellationToken| {
            let cancelled = cancelled.clone();
            async move {
                ctx.cancelled().await;
                cancelled.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskError>(())
            }
        })
    }

    #[tokio::test]
    async fn test_one_member_ending_cancels_siblings() {
        let bus = Bus::new(64);
        let parent = CancellationToken::new();
        let group = SupervisionGroup::new(&parent, bus);
        let cancelled = Arc::new(AtomicUsize::new(0));

        let extra = CancellationToken::new();
        group.watch("registration", extra.clone());
        for name in ["election", "pipe-manager", "status-manager"] {
            group.spawn(waiting(name, cancelled.clone()));
        }

        extra.cancel();
        group.done().await;
        group.shutdown(Some(Duration::from_secs(5))).await;

        assert_eq!(cancelled.load(Ordering::SeqCst), 3);
        assert_eq!(group.exited_member().as_deref(), Some("registration"));
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_failing_task_ends_group() {
        let group = SupervisionGroup::new(&CancellationToken::new(), Bus::new(64));
        let cancelled = Arc::new(AtomicUsize::new(0));
        group.spawn(waiting("pipe-manager", cancelled.clone()));
        group.spawn(TaskFn::arc("status-manager", |_ctx: CancellationToken| async {
            Err::<(), _>(TaskError::Fail {
                error: "store down".into(),
            })
        }));

        group.done().await;
        group.shutdown(Some(Duration::from_secs(5))).await;
        assert_eq!(group.exited_member().as_deref(), Some("status-manager"));
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let group = SupervisionGroup::new(&CancellationToken::new(), bus);
        let liveness = group.spawn(TaskFn::arc("boom", |_ctx: CancellationToken| async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), TaskError>(())
        }));

        liveness.cancelled().await;
        group.done().await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Panicked);
        assert_eq!(ev.reason.as_deref(), Some("kaboom"));
    }

    #[tokio::test]
    async fn test_parent_cancel_records_no_member() {
        let parent = CancellationToken::new();
        let group = SupervisionGroup::new(&parent, Bus::new(64));
        let cancelled = Arc::new(AtomicUsize::new(0));
        group.spawn(waiting("pipe-manager", cancelled.clone()));

        parent.cancel();
        group.done().await;
        group.shutdown(Some(Duration::from_secs(5))).await;
        assert_eq!(group.exited_member(), None);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }
}
