//! Delay policies for the node restart loop.
//!
//! ## Contents
//! - [`BackoffPolicy`] how delays between node runs evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization so a cluster-wide outage does not restart every node in lockstep
//!
//! ## Wiring
//! ```text
//! NodeConfig { restart: BackoffPolicy }
//!      └─► Node::run_with_restart uses restart.next(attempt) between runs
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
