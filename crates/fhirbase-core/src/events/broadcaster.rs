//! Event broadcaster for committed resource changes.
//!
//! Thread-safe, cloneable, backed by a tokio broadcast channel. A store's
//! `EventedStorage`/`EventedTransaction` wrapper is the sole publisher; the
//! subscription engine holds one receiver per tenant.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::ResourceEvent;

/// Events beyond this limit push out the oldest for receivers that fall behind.
const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ResourceEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send a resource event to all subscribers.
    ///
    /// Returns the number of subscribers that received it, or 0 if none are
    /// attached — callers use this to skip expensive event construction
    /// entirely when nobody is listening.
    pub fn send_resource(&self, event: ResourceEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    pub fn send_created(
        &self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource: serde_json::Value,
    ) -> usize {
        self.send_resource(ResourceEvent::created(resource_type, resource_id, resource))
    }

    pub fn send_updated(
        &self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource: serde_json::Value,
    ) -> usize {
        self.send_resource(ResourceEvent::updated(resource_type, resource_id, resource))
    }

    pub fn send_updated_with_previous(
        &self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        resource: serde_json::Value,
        previous: serde_json::Value,
    ) -> usize {
        self.send_resource(
            ResourceEvent::updated(resource_type, resource_id, resource).with_previous(previous),
        )
    }

    pub fn send_deleted(
        &self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> usize {
        self.send_resource(ResourceEvent::deleted(resource_type, resource_id))
    }

    /// Events sent before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
