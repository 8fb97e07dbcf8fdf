//! Typed prefix watches.
//!
//! [`WatchStream`] turns a raw [`CoordinationStore::watch_prefix`](crate::CoordinationStore::watch_prefix)
//! stream into a buffered channel of domain values produced by a pluggable
//! decode function.

mod stream;

pub use stream::WatchStream;
