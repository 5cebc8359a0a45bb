//! Parsing `SubscriptionTopic` resources into the engine's trigger index.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::NotifyError;
use crate::types::{EventTriggerDef, FilterSpec, NotificationShape, ResourceTriggerDef, TriggerInteraction, TriggerResult};

/// A `SubscriptionTopic`, resolved into per-resource-type trigger definitions.
#[derive(Debug, Clone)]
pub struct ParsedSubscriptionTopic {
    pub id: String,
    pub url: String,
    pub resource_triggers: HashMap<String, Vec<ResourceTriggerDef>>,
    pub event_triggers: HashMap<String, Vec<EventTriggerDef>>,
    pub allowed_filters: HashMap<String, Vec<FilterSpec>>,
    pub notification_shapes: HashMap<String, NotificationShape>,
}

impl ParsedSubscriptionTopic {
    pub fn resource_types(&self) -> impl Iterator<Item = &String> {
        self.resource_triggers.keys().chain(self.event_triggers.keys())
    }
}

pub fn parse_topic(value: &Value) -> Result<ParsedSubscriptionTopic, NotifyError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| NotifyError::InvalidTopic("missing id".into()))?
        .to_string();
    let url = value
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| NotifyError::InvalidTopic(format!("{id}: missing url")))?
        .to_string();

    let mut resource_triggers: HashMap<String, Vec<ResourceTriggerDef>> = HashMap::new();
    for trigger in value.get("resourceTrigger").and_then(Value::as_array).into_iter().flatten() {
        let resource = trigger
            .get("resource")
            .and_then(Value::as_str)
            .ok_or_else(|| NotifyError::InvalidTopic(format!("{url}: resourceTrigger missing resource")))?;

        let supported_interactions: HashSet<TriggerInteraction> = trigger
            .get("supportedInteraction")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter_map(TriggerInteraction::parse)
            .collect();

        let query_criteria = trigger.get("queryCriteria");
        let query_previous = query_criteria.and_then(|q| q.get("previous")).and_then(Value::as_str).map(str::to_string);
        let query_current = query_criteria.and_then(|q| q.get("current")).and_then(Value::as_str).map(str::to_string);
        let require_both_queries = query_criteria
            .and_then(|q| q.get("requireBoth"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let create_result = query_criteria
            .and_then(|q| q.get("resultForCreate"))
            .and_then(Value::as_str)
            .and_then(TriggerResult::parse);
        let delete_result = query_criteria
            .and_then(|q| q.get("resultForDelete"))
            .and_then(Value::as_str)
            .and_then(TriggerResult::parse);

        let def = ResourceTriggerDef {
            description: trigger.get("description").and_then(Value::as_str).map(str::to_string),
            supported_interactions,
            query_previous,
            query_current,
            require_both_queries,
            create_result,
            delete_result,
            fhir_path_criteria: trigger.get("fhirPathCriteria").and_then(Value::as_str).map(str::to_string),
        };
        resource_triggers.entry(resource.to_string()).or_default().push(def);
    }

    let mut event_triggers: HashMap<String, Vec<EventTriggerDef>> = HashMap::new();
    for trigger in value.get("eventTrigger").and_then(Value::as_array).into_iter().flatten() {
        let resource = trigger
            .get("resource")
            .and_then(Value::as_str)
            .ok_or_else(|| NotifyError::InvalidTopic(format!("{url}: eventTrigger missing resource")))?;
        let event = trigger.get("event");
        let event_code = event
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .ok_or_else(|| NotifyError::InvalidTopic(format!("{url}: eventTrigger missing event.code")))?
            .to_string();
        let def = EventTriggerDef {
            event_system: event.and_then(|e| e.get("system")).and_then(Value::as_str).map(str::to_string),
            event_code,
            description: trigger.get("description").and_then(Value::as_str).map(str::to_string),
        };
        event_triggers.entry(resource.to_string()).or_default().push(def);
    }

    let mut allowed_filters: HashMap<String, Vec<FilterSpec>> = HashMap::new();
    for entry in value.get("canFilterBy").and_then(Value::as_array).into_iter().flatten() {
        let resource = entry.get("resource").and_then(Value::as_str).map(str::to_string);
        let Some(filter_parameter) = entry.get("filterParameter").and_then(Value::as_str) else { continue };
        let key = resource.clone().unwrap_or_else(|| "*".to_string());
        allowed_filters.entry(key).or_default().push(FilterSpec {
            resource_type: resource,
            filter_parameter: filter_parameter.to_string(),
            comparator: None,
            modifier: None,
            value: String::new(),
        });
    }

    let mut notification_shapes: HashMap<String, NotificationShape> = HashMap::new();
    for shape in value.get("notificationShape").and_then(Value::as_array).into_iter().flatten() {
        let Some(resource) = shape.get("resource").and_then(Value::as_str) else { continue };
        let include = shape.get("include").and_then(Value::as_array).into_iter().flatten().filter_map(Value::as_str).map(str::to_string).collect();
        let rev_include = shape.get("revInclude").and_then(Value::as_array).into_iter().flatten().filter_map(Value::as_str).map(str::to_string).collect();
        notification_shapes.insert(resource.to_string(), NotificationShape { include, rev_include });
    }

    Ok(ParsedSubscriptionTopic {
        id,
        url,
        resource_triggers,
        event_triggers,
        allowed_filters,
        notification_shapes,
    })
}
