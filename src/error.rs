//! Error types used by the nodevisor runtime, its tasks and the store contract.
//!
//! - [`StoreError`]: failures reported by a [`CoordinationStore`](crate::CoordinationStore).
//! - [`TaskError`]: outcome of a single [`Task`](crate::Task) run.
//! - [`RegistrationError`]: why a [`Registration`](crate::Registration) run ended.
//! - [`ServiceError`]: start failures of leader-only subsystems.
//! - [`NodeError`]: why a [`Node`](crate::Node) run ended.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).

use thiserror::Error;

use crate::store::LeaseId;

/// # Errors produced by the coordination store.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The lease is unknown to the store (expired or revoked).
    #[error("lease {lease} not found")]
    LeaseNotFound {
        /// The lease the caller referred to.
        lease: LeaseId,
    },

    /// The connection or stream was closed by the store.
    #[error("store connection closed")]
    Closed,

    /// A value could not be encoded or decoded.
    #[error("codec error: {error}")]
    Codec {
        /// The underlying error message.
        error: String,
    },

    /// Any other backend failure.
    #[error("store backend error: {error}")]
    Backend {
        /// The underlying error message.
        error: String,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::LeaseNotFound { .. } => "store_lease_not_found",
            StoreError::Closed => "store_closed",
            StoreError::Codec { .. } => "store_codec",
            StoreError::Backend { .. } => "store_backend",
        }
    }

    /// True for the distinguished "lease not found" kind.
    pub fn is_lease_not_found(&self) -> bool {
        matches!(self, StoreError::LeaseNotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec {
            error: e.to_string(),
        }
    }
}

/// # Errors produced by task execution.
///
/// Returned by mandatory managers, pipeline stages and leader-only tasks.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Non-recoverable error.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Execution failed but a fresh run may succeed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task was cancelled due to parent context shutdown.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use nodevisor::TaskError;
    ///
    /// let err = TaskError::Fail { error: "boom".into() };
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        TaskError::Fail {
            error: e.to_string(),
        }
    }
}

/// # Reasons a registration run ended.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Opening a store connection failed.
    #[error("connect failed: {0}")]
    Connect(StoreError),

    /// Another owner already holds the key.
    #[error("key {key} already claimed at revision {create_revision}")]
    AlreadyClaimed {
        /// Registration key.
        key: String,
        /// Creation revision of the existing claim.
        create_revision: i64,
    },

    /// Keepalive reported that the store no longer knows the lease.
    #[error("lease lost: {0}")]
    LeaseLost(StoreError),

    /// The key exists but was created by someone else.
    #[error("fenced out of {key}: expected revision {expected}, found {found}")]
    Fenced {
        /// Registration key.
        key: String,
        /// Creation revision recorded at claim time.
        expected: i64,
        /// Creation revision currently stored.
        found: i64,
    },

    /// The key no longer exists.
    #[error("key {key} vanished")]
    KeyVanished {
        /// Registration key.
        key: String,
    },

    /// Any other store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistrationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistrationError::Connect(_) => "registration_connect",
            RegistrationError::AlreadyClaimed { .. } => "registration_already_claimed",
            RegistrationError::LeaseLost(_) => "registration_lease_lost",
            RegistrationError::Fenced { .. } => "registration_fenced",
            RegistrationError::KeyVanished { .. } => "registration_key_vanished",
            RegistrationError::Store(_) => "registration_store",
        }
    }

    /// True when ownership was lost after a successful claim.
    pub fn is_ownership_lost(&self) -> bool {
        matches!(
            self,
            RegistrationError::LeaseLost(_)
                | RegistrationError::Fenced { .. }
                | RegistrationError::KeyVanished { .. }
        )
    }
}

/// # Start failures of leader-only subsystems.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Building a fresh instance failed.
    #[error("build {service} failed: {error}")]
    Build {
        /// Subsystem name.
        service: String,
        /// The underlying error message.
        error: String,
    },

    /// Starting the instance failed.
    #[error("start {service} failed: {error}")]
    Start {
        /// Subsystem name.
        service: String,
        /// The underlying error message.
        error: String,
    },

    /// A store call made during start failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Build { .. } => "service_build",
            ServiceError::Start { .. } => "service_start",
            ServiceError::Store(_) => "service_store",
        }
    }
}

/// # Reasons a node run ended.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum NodeError {
    /// The node record is absent from the store.
    #[error("node {name} is not registered in the store")]
    MissingNode {
        /// Node name.
        name: String,
    },

    /// A mandatory member ended and the node was torn down.
    #[error("mandatory member {member} exited")]
    MemberExited {
        /// Name of the first member whose liveness fired.
        member: String,
    },

    /// The node record exists but could not be decoded.
    #[error("node {name} record is malformed: {error}")]
    Decode {
        /// Node name.
        name: String,
        /// The underlying error message.
        error: String,
    },

    /// The run panicked; the panic was contained.
    #[error("node run panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NodeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeError::MissingNode { .. } => "node_missing",
            NodeError::MemberExited { .. } => "node_member_exited",
            NodeError::Decode { .. } => "node_decode",
            NodeError::Panicked { .. } => "node_panicked",
            NodeError::Store(_) => "node_store",
        }
    }
}

/// Renders a panic payload caught by `catch_unwind` as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_lost_classification() {
        let lost = RegistrationError::Fenced {
            key: "k".into(),
            expected: 3,
            found: 9,
        };
        assert!(lost.is_ownership_lost());
        assert_eq!(lost.as_label(), "registration_fenced");

        let claimed = RegistrationError::AlreadyClaimed {
            key: "k".into(),
            create_revision: 3,
        };
        assert!(!claimed.is_ownership_lost());
    }

    #[test]
    fn test_panic_message_variants() {
        let a: Box<dyn std::any::Any + Send> = Box::new("static");
        let b: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(a.as_ref()), "static");
        assert_eq!(panic_message(b.as_ref()), "owned");
        assert_eq!(panic_message(c.as_ref()), "unknown panic");
    }
}
