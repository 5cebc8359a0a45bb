//! Subscription trigger evaluation and notification bundle assembly.
//!
//! One [`SubscriptionEngine`] per tenant. It holds the topic/subscription
//! indices described in SPEC §3 and runs the four-step algorithm in §4.6 each
//! time the store commits an `InstanceCreated`/`InstanceUpdated`/`InstanceDeleted`
//! event.

use std::collections::HashMap;
use std::sync::Arc;

use fhirbase_core::events::{ResourceEvent, ResourceEventType};
use fhirbase_search::{NullResolver, ReferenceResolver, SearchParameterParser, SearchParameterRegistry};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::channel::SubscriptionChannel;
use crate::error::NotifyError;
use crate::subscription::{ParsedSubscription, parse_subscription};
use crate::topic::{ParsedSubscriptionTopic, parse_topic};
use crate::types::{ContentLevel, GeneratedEvent, SubscriptionStatus, TriggerInteraction};

/// One delivered (or attempted) notification, returned from [`SubscriptionEngine::on_event`]
/// so callers and tests can observe what fired without depending on the channel's side effects.
#[derive(Debug, Clone)]
pub struct NotificationOutcome {
    pub subscription_id: String,
    pub event_number: u64,
    pub bundle: Value,
    pub delivered: bool,
}

pub struct SubscriptionEngine {
    registry: Arc<SearchParameterRegistry>,
    channels: Vec<Arc<dyn SubscriptionChannel>>,
    topics: RwLock<HashMap<String, ParsedSubscriptionTopic>>,
    topics_by_type: RwLock<HashMap<String, Vec<String>>>,
    subscriptions: RwLock<HashMap<String, ParsedSubscription>>,
    subscriptions_by_topic: RwLock<HashMap<String, Vec<String>>>,
}

impl SubscriptionEngine {
    pub fn new(registry: Arc<SearchParameterRegistry>, channels: Vec<Arc<dyn SubscriptionChannel>>) -> Self {
        Self {
            registry,
            channels,
            topics: RwLock::new(HashMap::new()),
            topics_by_type: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            subscriptions_by_topic: RwLock::new(HashMap::new()),
        }
    }

    /// Ingests a `SubscriptionTopic`, rebuilding `topics_by_type` atomically.
    pub async fn register_topic(&self, value: &Value) -> Result<(), NotifyError> {
        let topic = parse_topic(value)?;
        let url = topic.url.clone();
        let resource_types: Vec<String> = topic.resource_types().cloned().collect();

        let mut topics = self.topics.write().await;
        let mut by_type = self.topics_by_type.write().await;
        topics.insert(url.clone(), topic);
        for ty in resource_types {
            let entry = by_type.entry(ty).or_default();
            if !entry.contains(&url) {
                entry.push(url.clone());
            }
        }
        debug!(topic = %url, "registered subscription topic");
        Ok(())
    }

    /// Ingests a `Subscription`, validating its topic reference.
    pub async fn register_subscription(&self, value: &Value) -> Result<(), NotifyError> {
        let known_urls: Vec<String> = self.topics.read().await.keys().cloned().collect();
        let sub = parse_subscription(value, &known_urls)?;
        let id = sub.id.clone();
        let topic_url = sub.topic_url.clone();

        let mut subs = self.subscriptions.write().await;
        let mut by_topic = self.subscriptions_by_topic.write().await;
        subs.insert(id.clone(), sub);
        let entry = by_topic.entry(topic_url).or_default();
        if !entry.contains(&id) {
            entry.push(id.clone());
        }
        debug!(subscription = %id, "registered subscription");
        Ok(())
    }

    /// The single point where subscription status transitions are recorded.
    pub async fn change_status(&self, subscription_id: &str, status: SubscriptionStatus) -> Result<(), NotifyError> {
        let mut subs = self.subscriptions.write().await;
        let sub = subs
            .get_mut(subscription_id)
            .ok_or_else(|| NotifyError::InvalidSubscription(format!("unknown subscription {subscription_id}")))?;
        sub.current_status = status;
        debug!(subscription = %subscription_id, status = status.as_str(), "subscription status changed");
        Ok(())
    }

    pub async fn subscription(&self, id: &str) -> Option<ParsedSubscription> {
        self.subscriptions.read().await.get(id).cloned()
    }

    /// Runs the §4.6 trigger evaluation algorithm for a single committed event.
    pub async fn on_event(&self, event: &ResourceEvent) -> Result<Vec<NotificationOutcome>, NotifyError> {
        self.on_event_with_resolver(event, &NullResolver).await
    }

    pub async fn on_event_with_resolver(
        &self,
        event: &ResourceEvent,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Vec<NotificationOutcome>, NotifyError> {
        let interaction = match event.event_type {
            ResourceEventType::Created => TriggerInteraction::Create,
            ResourceEventType::Updated => TriggerInteraction::Update,
            ResourceEventType::Deleted => TriggerInteraction::Delete,
        };

        let topic_urls = self
            .topics_by_type
            .read()
            .await
            .get(&event.resource_type)
            .cloned()
            .unwrap_or_default();

        let mut outcomes = Vec::new();
        for topic_url in topic_urls {
            let Some(topic) = self.topics.read().await.get(&topic_url).cloned() else { continue };
            let Some(triggers) = topic.resource_triggers.get(&event.resource_type).cloned() else { continue };

            for trigger in &triggers {
                if !trigger.supported_interactions.contains(&interaction) {
                    continue;
                }
                if !self.trigger_fires(event, trigger).await {
                    continue;
                }
                debug!(topic = %topic_url, resource_type = %event.resource_type, "topic trigger matched");

                let subscription_ids = self
                    .subscriptions_by_topic
                    .read()
                    .await
                    .get(&topic_url)
                    .cloned()
                    .unwrap_or_default();

                for sub_id in subscription_ids {
                    if let Some(outcome) = self.fire_subscription(&sub_id, &topic, event, resolver).await? {
                        outcomes.push(outcome);
                    }
                }
            }
        }

        Ok(outcomes)
    }

    async fn trigger_fires(&self, event: &ResourceEvent, trigger: &crate::types::ResourceTriggerDef) -> bool {
        let current_ok = match (&trigger.query_current, &event.resource) {
            (Some(query), Some(resource)) => self.query_matches(&event.resource_type, query, resource).await,
            (Some(_), None) => false,
            (None, _) => true,
        };
        if !current_ok {
            return false;
        }

        if trigger.require_both_queries {
            let previous_ok = match (&trigger.query_previous, &event.previous) {
                (Some(query), Some(previous)) => self.query_matches(&event.resource_type, query, previous).await,
                (Some(_), None) => false,
                (None, _) => true,
            };
            if !previous_ok {
                return false;
            }
        }

        if let Some(create_result) = trigger.create_result
            && event.event_type == ResourceEventType::Created
            && !create_result.matches(current_ok)
        {
            return false;
        }
        if let Some(delete_result) = trigger.delete_result
            && event.event_type == ResourceEventType::Deleted
            && !delete_result.matches(current_ok)
        {
            return false;
        }

        if let Some(expression) = &trigger.fhir_path_criteria {
            return self.fhir_path_criteria_holds(expression, event);
        }

        true
    }

    async fn query_matches(&self, resource_type: &str, query: &str, resource: &Value) -> bool {
        let parsed = SearchParameterParser::parse_query(query);
        let resolved = parsed.resolve(resource_type, &self.registry);
        fhirbase_search::evaluator::matches(resource, &resolved, &NullResolver).await
    }

    /// Evaluates a `%current.`/`%previous.`-scoped simple path expression.
    /// Operators beyond a plain dotted path (e.g. `=`, `and`) aren't understood by the
    /// in-process navigator (see SPEC §9); such expressions default to "satisfied"
    /// rather than silently blocking every notification.
    fn fhir_path_criteria_holds(&self, expression: &str, event: &ResourceEvent) -> bool {
        let (context, path) = if let Some(rest) = expression.strip_prefix("%current.") {
            (event.resource.as_ref(), rest)
        } else if let Some(rest) = expression.strip_prefix("%previous.") {
            (event.previous.as_ref(), rest)
        } else {
            warn!(expression, "fhirPathCriteria without %current/%previous scope; treating as satisfied");
            return true;
        };

        if path.chars().any(|c| "=!<>()".contains(c)) {
            warn!(expression, "fhirPathCriteria beyond simple path navigation; treating as satisfied");
            return true;
        }

        let Some(context) = context else { return false };
        let elements = fhirbase_search::evaluator::extract_elements(context, path);
        elements.iter().any(|e| !matches!(e, Value::Bool(false) | Value::Null))
    }

    async fn fire_subscription(
        &self,
        sub_id: &str,
        topic: &ParsedSubscriptionTopic,
        event: &ResourceEvent,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Option<NotificationOutcome>, NotifyError> {
        let mut subs = self.subscriptions.write().await;
        let Some(sub) = subs.get_mut(sub_id) else { return Ok(None) };
        if sub.current_status == SubscriptionStatus::Off || sub.current_status == SubscriptionStatus::Error {
            return Ok(None);
        }

        if let Some(resource) = &event.resource {
            let filters = sub.filters_for(&event.resource_type);
            if !filters.is_empty() {
                let query = filters
                    .iter()
                    .map(|f| {
                        let modifier = f.modifier.as_deref().map(|m| format!(":{m}")).unwrap_or_default();
                        let prefix = f.comparator.as_deref().unwrap_or("");
                        format!("{}{}={}{}", f.filter_parameter, modifier, prefix, f.value)
                    })
                    .collect::<Vec<_>>()
                    .join("&");
                drop(subs);
                if !self.query_matches(&event.resource_type, &query, resource).await {
                    return Ok(None);
                }
                subs = self.subscriptions.write().await;
            }
        }

        let Some(sub) = subs.get_mut(sub_id) else { return Ok(None) };
        let event_number = sub.next_event_number();
        let focus = format!("{}/{}", event.resource_type, event.resource_id);
        let shape = topic.notification_shapes.get(&event.resource_type).cloned().unwrap_or_default();

        sub.generated_events.insert(
            event_number,
            GeneratedEvent {
                event_number,
                timestamp: event.timestamp,
                focus: focus.clone(),
                additional_context: shape.include.clone(),
            },
        );
        sub.current_event_count = event_number;
        let content_level = sub.content_level;
        let endpoint = sub.endpoint.clone();
        let channel_code = sub.channel_code.clone();
        drop(subs);

        let bundle = self.assemble_bundle(sub_id, event_number, content_level, event, &focus, &shape, resolver).await;

        let delivered = if let Some(endpoint) = endpoint {
            let channel = self.channels.iter().find(|c| c.supports(&channel_code));
            match channel {
                Some(channel) => match channel.deliver(&endpoint, &bundle).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(subscription = %sub_id, error = %err, "notification delivery failed");
                        false
                    }
                },
                None => {
                    warn!(subscription = %sub_id, channel = %channel_code, "no channel registered for subscription");
                    false
                }
            }
        } else {
            false
        };

        Ok(Some(NotificationOutcome { subscription_id: sub_id.to_string(), event_number, bundle, delivered }))
    }

    async fn assemble_bundle(
        &self,
        sub_id: &str,
        event_number: u64,
        content_level: ContentLevel,
        event: &ResourceEvent,
        focus: &str,
        shape: &crate::types::NotificationShape,
        resolver: &dyn ReferenceResolver,
    ) -> Value {
        let status_entry = json!({
            "resource": {
                "resourceType": "SubscriptionStatus",
                "subscription": {"reference": format!("Subscription/{sub_id}")},
                "topic": focus,
                "type": "event-notification",
                "eventsSinceSubscriptionStart": event_number.to_string(),
                "notificationEvent": [{"eventNumber": event_number.to_string(), "focus": {"reference": focus}}],
            }
        });

        let mut entries = vec![status_entry];

        if content_level != ContentLevel::Empty
            && let Some(resource) = &event.resource
        {
            match content_level {
                ContentLevel::IdOnly => entries.push(json!({"resource": {"reference": focus}})),
                ContentLevel::FullResource => {
                    entries.push(json!({"resource": resource}));
                    for include in &shape.include {
                        if let Some((_, search_param)) = include.split_once(':')
                            && let Some(reference) = resource.get(search_param).and_then(|r| r.get("reference")).and_then(Value::as_str)
                            && let Some((ref_type, ref_id)) = reference.rsplit_once('/')
                            && let Some(referent) = resolver.resolve(ref_type, ref_id).await
                        {
                            entries.push(json!({"resource": referent}));
                        }
                    }
                }
                ContentLevel::Empty => unreachable!(),
            }
        }

        json!({
            "resourceType": "Bundle",
            "type": "subscription-notification",
            "entry": entries,
        })
    }
}
