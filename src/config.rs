//! # Runtime configuration.
//!
//! [`Config`] centralizes cadences, capacities and policy constants. Every value
//! has a default tuned for small clusters; none of them is a hard
//! invariant.
//!
//! Loading from files or the environment is left to the embedding process;
//! this module only defines shape and defaults.
//!
//! ## Sentinel values
//! - `RecorderConfig::retention = 0s` → pruning disabled
//! - `NodeConfig::grace = 0s` → do not wait for members on teardown

use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Registration cadences.
#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    /// Lease TTL in seconds.
    pub ttl_secs: i64,
    /// Period between keepalives.
    pub keepalive_interval: Duration,
    /// Period between fencing reads.
    pub fencing_interval: Duration,
}

impl Default for RegistrationConfig {
    /// `ttl = 5s`, `keepalive = 1s`, `fencing = 5s`.
    fn default() -> Self {
        Self {
            ttl_secs: 5,
            keepalive_interval: Duration::from_secs(1),
            fencing_interval: Duration::from_secs(5),
        }
    }
}

/// Watch stream buffering.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Capacity of the typed output channel.
    pub buffer: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { buffer: 1000 }
    }
}

/// Event recorder policy.
#[derive(Clone, Debug)]
pub struct RecorderConfig {
    /// Ingest channel capacity; `EventRecorder::event` blocks when full.
    pub ingest_capacity: usize,
    /// Channel between the dispatch and flush loops.
    pub flush_capacity: usize,
    /// Number of aggregation keys kept in the recency cache.
    pub cache_capacity: usize,
    /// Aggregation window measured from an entry's first occurrence.
    pub window: Duration,
    /// Pending size that triggers an immediate flush.
    pub flush_threshold: usize,
    /// Period of the time-based flush.
    pub flush_interval: Duration,
    /// Age (by last occurrence) after which persisted events are pruned.
    pub retention: Duration,
    /// Period of the pruning pass.
    pub prune_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 16384,
            flush_capacity: 4096,
            cache_capacity: 4096,
            window: Duration::from_secs(5 * 60),
            flush_threshold: 100,
            flush_interval: Duration::from_secs(10),
            retention: Duration::from_secs(24 * 60 * 60),
            prune_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl RecorderConfig {
    /// Retention as an `Option` (`None` = pruning disabled).
    #[inline]
    pub fn retention(&self) -> Option<Duration> {
        if self.retention == Duration::ZERO {
            None
        } else {
            Some(self.retention)
        }
    }
}

/// Role supervision cadence.
#[derive(Clone, Debug)]
pub struct RoleConfig {
    /// Period of the re-evaluation of the last known role.
    pub recheck_interval: Duration,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            recheck_interval: Duration::from_secs(3),
        }
    }
}

/// Node-level settings.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Prefix of every key the node reads or writes.
    pub key_prefix: String,
    /// Period of the status report.
    pub status_interval: Duration,
    /// Delay between campaigns while another node leads.
    pub election_retry: Duration,
    /// How long teardown waits for members to finish.
    pub grace: Duration,
    /// Delays between node runs in the restart loop.
    pub restart: BackoffPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            key_prefix: "/nodevisor".to_string(),
            status_interval: Duration::from_secs(5),
            election_retry: Duration::from_secs(1),
            grace: Duration::from_secs(10),
            restart: BackoffPolicy {
                first: Duration::from_secs(1),
                max: Duration::from_secs(30),
                factor: 2.0,
                jitter: JitterPolicy::Equal,
            },
        }
    }
}

impl NodeConfig {
    /// Grace period as an `Option` (`None` = do not wait).
    #[inline]
    pub fn grace(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }
}

/// Global configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub registration: RegistrationConfig,
    pub watch: WatchConfig,
    pub recorder: RecorderConfig,
    pub role: RoleConfig,
    pub node: NodeConfig,
    /// Capacity of the event bus ring buffer (min 1; clamped by `Bus`).
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registration: RegistrationConfig::default(),
            watch: WatchConfig::default(),
            recorder: RecorderConfig::default(),
            role: RoleConfig::default(),
            node: NodeConfig::default(),
            bus_capacity: 1024,
        }
    }
}
