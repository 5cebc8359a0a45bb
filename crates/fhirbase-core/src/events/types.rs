//! Event types for the resource change notification system.
//!
//! `ResourceEvent` is the payload carried by [`super::broadcaster::EventBroadcaster`]
//! from committed store mutations to the subscription engine.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Type of resource change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceEventType {
    Created,
    Updated,
    Deleted,
}

impl ResourceEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceEventType::Created => "created",
            ResourceEventType::Updated => "updated",
            ResourceEventType::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ResourceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event representing a committed change to a FHIR resource.
///
/// Emitted only after a write has committed — never for reads, and never for
/// a transaction bundle that rolled back. See the store's `EventedStorage`
/// wrapper for the emission point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub event_type: ResourceEventType,
    pub resource_type: String,
    pub resource_id: String,
    pub version_id: Option<u64>,
    /// The resource body as JSON (`None` for deletions).
    pub resource: Option<serde_json::Value>,
    /// The before-image for `Updated` events (`None` for creates/deletes).
    /// Subscription topics with a `queryPrevious` criterion evaluate against this.
    pub previous: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ResourceEvent {
    pub fn new(
        event_type: ResourceEventType,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            version_id: None,
            resource,
            previous: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn created(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource: serde_json::Value,
    ) -> Self {
        Self::new(
            ResourceEventType::Created,
            resource_type,
            resource_id,
            Some(resource),
        )
    }

    pub fn updated(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource: serde_json::Value,
    ) -> Self {
        Self::new(
            ResourceEventType::Updated,
            resource_type,
            resource_id,
            Some(resource),
        )
    }

    pub fn deleted(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::new(ResourceEventType::Deleted, resource_type, resource_id, None)
    }

    pub fn with_version(mut self, version_id: u64) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn with_previous(mut self, previous: serde_json::Value) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn matches_type(&self, filter_type: Option<&str>) -> bool {
        match filter_type {
            Some(t) => self.resource_type == t,
            None => true,
        }
    }

    pub fn matches_event_type(&self, filter: Option<ResourceEventType>) -> bool {
        match filter {
            Some(t) => self.event_type == t,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_event_created() {
        let event = ResourceEvent::created("Patient", "123", serde_json::json!({"id": "123"}));
        assert_eq!(event.event_type, ResourceEventType::Created);
        assert_eq!(event.resource_type, "Patient");
        assert_eq!(event.resource_id, "123");
        assert!(event.resource.is_some());
    }

    #[test]
    fn resource_event_matches() {
        let event = ResourceEvent::created("Patient", "123", serde_json::json!({}));
        assert!(event.matches_type(Some("Patient")));
        assert!(!event.matches_type(Some("Observation")));
        assert!(event.matches_type(None));
        assert!(event.matches_event_type(Some(ResourceEventType::Created)));
        assert!(!event.matches_event_type(Some(ResourceEventType::Deleted)));
    }

    #[test]
    fn event_serialization_round_trips() {
        let event = ResourceEvent::created("Patient", "123", serde_json::json!({"id": "123"}));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ResourceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.resource_type, "Patient");
        assert_eq!(parsed.resource_id, "123");
    }
}
