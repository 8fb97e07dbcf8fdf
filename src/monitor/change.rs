use std::fmt;

use crate::error::StoreError;
use crate::store::{Keyspace, WatchEvent, WatchEventKind};

/// Which record family changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeScope {
    Node,
    Pipeline,
    Status,
}

impl ChangeScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeScope::Node => "nodes",
            ChangeScope::Pipeline => "pipelines",
            ChangeScope::Status => "status",
        }
    }

    /// Watched directory of this scope in `keys`.
    pub fn dir(self, keys: &Keyspace) -> String {
        match self {
            ChangeScope::Node => keys.nodes(),
            ChangeScope::Pipeline => keys.pipelines(),
            ChangeScope::Status => keys.statuses(),
        }
    }
}

impl fmt::Display for ChangeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed change of a cluster record.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterChange {
    pub scope: ChangeScope,
    pub kind: WatchEventKind,
    /// Record name (key relative to the scope directory).
    pub name: String,
    /// Decoded record; `None` for deletes.
    pub value: Option<serde_json::Value>,
    pub revision: i64,
}

impl ClusterChange {
    /// Decodes a raw notification under `dir`.
    ///
    /// Keys equal to `dir` itself are ignored; a put whose payload is not JSON is an error.
    pub fn decode(scope: ChangeScope, dir: &str, ev: &WatchEvent) -> Result<Option<Self>, StoreError> {
        let Some(name) = Keyspace::name_in(dir, &ev.key) else {
            return Ok(None);
        };
        let value = match ev.kind {
            WatchEventKind::Put => Some(serde_json::from_slice(&ev.value)?),
            WatchEventKind::Delete => None,
        };
        Ok(Some(Self {
            scope,
            kind: ev.kind,
            name: name.to_string(),
            value,
            revision: ev.revision,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, value: &[u8]) -> WatchEvent {
        WatchEvent {
            kind: WatchEventKind::Put,
            key: key.into(),
            value: value.to_vec(),
            revision: 7,
        }
    }

    #[test]
    fn test_decode() {
        let dir = Keyspace::new("/t").pipelines();
        let c = ClusterChange::decode(ChangeScope::Pipeline, &dir, &put("/t/pipelines/p1", br#"{"id":1}"#))
            .unwrap()
            .unwrap();
        assert_eq!(c.name, "p1");
        assert_eq!(c.value, Some(serde_json::json!({"id": 1})));

        assert!(ClusterChange::decode(ChangeScope::Pipeline, &dir, &put("/t/pipelines/", b"{}"))
            .unwrap()
            .is_none());
        assert!(ClusterChange::decode(ChangeScope::Pipeline, &dir, &put("/t/pipelines/p2", b"{oops"))
            .is_err());
    }
}
