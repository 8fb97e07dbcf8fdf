//! # Event subscriber trait.
//!
//! Each subscriber gets a dedicated worker task fed by its own bounded queue
//! (capacity via [`Subscribe::queue_capacity`]). Panics inside a subscriber are
//! caught and reported as `EventKind::SubscriberPanicked`.
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event **for this subscriber only** and publishes
//!   `EventKind::SubscriberOverflow`.
//! - Events are processed sequentially (FIFO) per subscriber.

use async_trait::async_trait;

use crate::events::Event;

/// Observer of lifecycle events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, called from the subscriber's own worker task.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (clamped to at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
