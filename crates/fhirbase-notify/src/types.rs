//! Shared value types for subscription topics, subscriptions, and the
//! notification bundles the engine assembles from them.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// `Subscription.channelType` payload shape, mirroring the FHIR R5
/// `subscription-notification` content-level value set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentLevel {
    Empty,
    IdOnly,
    FullResource,
}

impl ContentLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(Self::Empty),
            "id-only" => Some(Self::IdOnly),
            "full-resource" => Some(Self::FullResource),
            _ => None,
        }
    }
}

/// `Subscription.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Requested,
    Active,
    Error,
    Off,
}

impl SubscriptionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested),
            "active" => Some(Self::Active),
            "error" => Some(Self::Error),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Active => "active",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

/// The expected outcome of `queryCurrent`/`queryPrevious` for the trigger to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerResult {
    TestPasses,
    TestFails,
}

impl TriggerResult {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "test-passes" => Some(Self::TestPasses),
            "test-fails" => Some(Self::TestFails),
            _ => None,
        }
    }

    pub fn matches(&self, query_matched: bool) -> bool {
        match self {
            Self::TestPasses => query_matched,
            Self::TestFails => !query_matched,
        }
    }
}

/// The three interactions a `SubscriptionTopic.resourceTrigger` can fire on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerInteraction {
    Create,
    Update,
    Delete,
}

impl TriggerInteraction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A single `SubscriptionTopic.resourceTrigger` entry, scoped to one resource type.
#[derive(Debug, Clone)]
pub struct ResourceTriggerDef {
    pub description: Option<String>,
    pub supported_interactions: HashSet<TriggerInteraction>,
    pub query_previous: Option<String>,
    pub query_current: Option<String>,
    pub require_both_queries: bool,
    pub create_result: Option<TriggerResult>,
    pub delete_result: Option<TriggerResult>,
    pub fhir_path_criteria: Option<String>,
}

/// A `SubscriptionTopic.eventTrigger` entry.
#[derive(Debug, Clone)]
pub struct EventTriggerDef {
    pub event_system: Option<String>,
    pub event_code: String,
    pub description: Option<String>,
}

/// Which related resources a notification for this topic/type should carry,
/// expressed the way `_include`/`_revinclude` are on a search.
#[derive(Debug, Clone, Default)]
pub struct NotificationShape {
    pub include: Vec<String>,
    pub rev_include: Vec<String>,
}

/// A search-parameter-shaped filter a `Subscription` is allowed to apply
/// against one of its topic's resource triggers.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub resource_type: Option<String>,
    pub filter_parameter: String,
    pub comparator: Option<String>,
    pub modifier: Option<String>,
    pub value: String,
}

/// One fired trigger, recorded against a subscription in arrival order.
#[derive(Debug, Clone)]
pub struct GeneratedEvent {
    pub event_number: u64,
    #[allow(dead_code)]
    pub timestamp: OffsetDateTime,
    pub focus: String,
    pub additional_context: Vec<String>,
}

/// Filters keyed per resource type, with `"*"` meaning "applies to every
/// type the topic triggers on".
pub type FilterMap = HashMap<String, Vec<FilterSpec>>;

/// `GeneratedEvents` in the spec is an ordered map keyed by event number;
/// a `BTreeMap` gives us that ordering for free.
pub type EventLog = BTreeMap<u64, GeneratedEvent>;
