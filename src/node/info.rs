//! Node records stored under the keyspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::election::Role;
use crate::error::StoreError;
use crate::store::{Keyspace, StoreRef};

/// Descriptor of one node, stored at [`Keyspace::node`] and used as registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Writes this record; a node must be saved before it can run.
    pub async fn save(&self, store: &StoreRef, keys: &Keyspace) -> Result<(), StoreError> {
        let value = serde_json::to_vec(self)?;
        store.put(&keys.node(&self.name), value, None).await?;
        Ok(())
    }
}

/// Periodic status report of one node, stored at [`Keyspace::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node: String,
    pub role: Role,
    pub updated_at: DateTime<Utc>,
}
