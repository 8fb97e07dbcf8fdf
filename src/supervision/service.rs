//! # Leader-only subsystem contract.
//!
//! A [`Service`] is started when the node becomes leader and stopped when it
//! stops being one. `start` returns once the subsystem is running (its work
//! continues in background tasks); [`Service::status`] reports whether it is
//! still running, so a subsystem that died on its own is noticed and rebuilt.

use std::fmt;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::TaskRef;

/// Externally visible health of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
}

impl ServiceStatus {
    /// `"run"` or `"stop"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Running => "run",
            ServiceStatus::Stopped => "stop",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start/stop/status contract; `start` while running and `stop` while stopped are no-ops.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Starts the service under `ctx`.
    async fn start(&self, ctx: &CancellationToken) -> Result<(), ServiceError>;

    /// Stops the service and waits for its background work to end.
    async fn stop(&self);

    fn status(&self) -> ServiceStatus;
}

struct Running {
    ctx: CancellationToken,
    done: CancellationToken,
    handle: JoinHandle<()>,
}

/// [`Service`] running one [`Task`](crate::Task) in the background.
///
/// The service is `Stopped` as soon as the task returns or panics.
pub struct TaskService {
    task: TaskRef,
    bus: Bus,
    running: Mutex<Option<Running>>,
}

impl TaskService {
    pub fn new(task: TaskRef, bus: Bus) -> Self {
        Self {
            task,
            bus,
            running: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Service for TaskService {
    fn name(&self) -> &str {
        self.task.name()
    }

    async fn start(&self, ctx: &CancellationToken) -> Result<(), ServiceError> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.done.is_cancelled()) {
            return Ok(());
        }
        if ctx.is_cancelled() {
            return Err(ServiceError::Start {
                service: self.task.name().to_string(),
                error: "parent context cancelled".to_string(),
            });
        }

        let child = ctx.child_token();
        let done = CancellationToken::new();
        let handle = tokio::spawn({
            let task = self.task.clone();
            let bus = self.bus.clone();
            let child = child.clone();
            let done = done.clone();
            async move {
                let _done = done.drop_guard();
                match std::panic::AssertUnwindSafe(task.run(child)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => bus.publish(
                        Event::new(EventKind::SubsystemStopped)
                            .with_component(task.name())
                            .with_reason(e.to_string()),
                    ),
                    Err(panic) => bus.publish(
                        Event::new(EventKind::Panicked)
                            .with_component(task.name())
                            .with_reason(panic_message(&*panic)),
                    ),
                }
            }
        });
        *running = Some(Running {
            ctx: child,
            done,
            handle,
        });
        Ok(())
    }

    async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.ctx.cancel();
        let _ = running.handle.await;
    }

    fn status(&self) -> ServiceStatus {
        match self.running.lock().as_ref() {
            Some(r) if !r.done.is_cancelled() => ServiceStatus::Running,
            _ => ServiceStatus::Stopped,
        }
    }
}
