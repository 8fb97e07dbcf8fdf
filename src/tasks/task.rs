//! # Task abstraction.
//!
//! A task receives a [`CancellationToken`] and runs until it is cancelled or
//! fails. Returning (with `Ok` or `Err`) is what fires the task's liveness
//! signal inside a [`SupervisionGroup`](crate::SupervisionGroup).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// # Asynchronous, cancelable unit.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use async_trait::async_trait;
/// use nodevisor::{Task, TaskError};
///
/// struct PipeManager;
///
/// #[async_trait]
/// impl Task for PipeManager {
///     fn name(&self) -> &str { "pipe-manager" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
///         ctx.cancelled().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Executes the task until completion or cancellation.
    ///
    /// Implementations should watch `ctx` and exit promptly once it is cancelled.
    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError>;
}
