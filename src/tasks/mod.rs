//! # Task abstractions.
//!
//! A [`Task`] is the unit every long-running collaborator is expressed as:
//! mandatory per-node managers, pipeline stages, leader-only jobs such as the
//! scheduler or the event pruner.
//!
//! - [`Task`] - trait for async, cancelable work with a stable name
//! - [`TaskFn`] - closure-backed implementation
//! - [`TaskRef`] - shared handle (`Arc<dyn Task>`)

mod task;
mod task_fn;

pub use task::Task;
pub use task_fn::{TaskFn, TaskRef};
