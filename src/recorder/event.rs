//! # AggregatedEvent: a counted occurrence of a recurring condition.
//!
//! The aggregation key is `type`, `resource_type`, `resource_name`, `message` and
//! `node_name` joined by the ASCII unit separator (`\u{1f}`).
//! While the window opened by `first_time` is still open, repeated occurrences
//! only bump `count` and `last_time`; afterwards the next occurrence starts a
//! new record with its own `id`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

const KEY_SEPARATOR: &str = "\u{1f}";

/// Severity of an operational event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Info,
    Warning,
    Error,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventType::Info => "info",
            EventType::Warning => "warning",
            EventType::Error => "error",
        })
    }
}

/// Kind of resource an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Pipeline,
    Node,
    Cluster,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceType::Pipeline => "pipeline",
            ResourceType::Node => "node",
            ResourceType::Cluster => "cluster",
        })
    }
}

/// Persisted, counted event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedEvent {
    /// Record identity: `<aggregation key>@<first_time millis>`; empty until recorded.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub message: String,
    /// Stamped by the recorder when left empty.
    pub node_name: String,
    pub count: u64,
    pub first_time: DateTime<Utc>,
    pub last_time: DateTime<Utc>,
}

impl AggregatedEvent {
    /// Creates an unrecorded occurrence; the recorder fills identity, count and timestamps.
    pub fn new(
        event_type: EventType,
        resource_type: ResourceType,
        resource_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            event_type,
            resource_type,
            resource_name: resource_name.into(),
            message: message.into(),
            node_name: String::new(),
            count: 0,
            first_time: DateTime::<Utc>::default(),
            last_time: DateTime::<Utc>::default(),
        }
    }

    pub fn info_pipeline(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventType::Info, ResourceType::Pipeline, name, message)
    }

    pub fn error_pipeline(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventType::Error, ResourceType::Pipeline, name, message)
    }

    pub fn error_node(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventType::Error, ResourceType::Node, name, message)
    }

    /// Sets the node name explicitly instead of letting the recorder stamp it.
    pub fn on_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn aggregation_key(&self) -> String {
        [
            self.event_type.to_string().as_str(),
            self.resource_type.to_string().as_str(),
            self.resource_name.as_str(),
            self.message.as_str(),
            self.node_name.as_str(),
        ]
        .join(KEY_SEPARATOR)
    }

    /// True while `now` is not past `first_time + window` (the end instant itself is still open).
    pub fn window_open(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Ok(delta) = TimeDelta::from_std(window) else {
            return true;
        };
        match self.first_time.checked_add_signed(delta) {
            Some(end) => !(end < now),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_key() {
        let e = AggregatedEvent::error_pipeline("p1", "boom").on_node("n1");
        assert_eq!(
            e.aggregation_key(),
            "error\u{1f}pipeline\u{1f}p1\u{1f}boom\u{1f}n1"
        );
    }

    #[test]
    fn test_dotted_fields_do_not_collide() {
        let a = AggregatedEvent::error_pipeline("a.b", "c").on_node("n1");
        let b = AggregatedEvent::error_pipeline("a", "b.c").on_node("n1");
        assert_ne!(a.aggregation_key(), b.aggregation_key());
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let mut e = AggregatedEvent::info_pipeline("p1", "ok");
        e.first_time = Utc::now();
        let window = Duration::from_secs(300);
        let end = e.first_time + TimeDelta::seconds(300);

        assert!(e.window_open(end, window));
        assert!(!e.window_open(end + TimeDelta::milliseconds(1), window));
    }

    #[test]
    fn test_json_shape() {
        let e = AggregatedEvent::error_pipeline("p1", "boom");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["resource_type"], "pipeline");
        let back: AggregatedEvent = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }
}
