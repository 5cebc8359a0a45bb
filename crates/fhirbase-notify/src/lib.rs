//! Subscription topic/subscription ingest, trigger evaluation, and
//! notification bundle assembly for the in-memory FHIR store.

pub mod channel;
pub mod engine;
pub mod error;
pub mod subscription;
pub mod topic;
pub mod types;

pub use channel::{NullChannel, RestHookChannel, SubscriptionChannel};
pub use engine::{NotificationOutcome, SubscriptionEngine};
pub use error::NotifyError;
pub use subscription::{ParsedSubscription, parse_subscription};
pub use topic::{ParsedSubscriptionTopic, parse_topic};
pub use types::{
    ContentLevel, EventLog, EventTriggerDef, FilterMap, FilterSpec, GeneratedEvent,
    NotificationShape, ResourceTriggerDef, SubscriptionStatus, TriggerInteraction, TriggerResult,
};
