//! Parsing `Subscription` resources and tracking their runtime state.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::NotifyError;
use crate::types::{ContentLevel, EventLog, FilterMap, FilterSpec, SubscriptionStatus};

/// A `Subscription`, resolved against its topic and ready for trigger evaluation.
#[derive(Debug, Clone)]
pub struct ParsedSubscription {
    pub id: String,
    pub topic_url: String,
    pub channel_system: Option<String>,
    pub channel_code: String,
    pub endpoint: Option<String>,
    pub heartbeat_seconds: Option<u32>,
    pub timeout_seconds: Option<u32>,
    pub content_type: Option<String>,
    pub content_level: ContentLevel,
    pub max_events_per_notification: Option<u32>,
    pub parameters: HashMap<String, Vec<String>>,
    pub filters: FilterMap,
    pub current_status: SubscriptionStatus,
    pub current_event_count: u64,
    pub generated_events: EventLog,
}

impl ParsedSubscription {
    pub fn next_event_number(&self) -> u64 {
        self.current_event_count + 1
    }

    pub fn filters_for(&self, resource_type: &str) -> Vec<&FilterSpec> {
        let mut out: Vec<&FilterSpec> = self.filters.get(resource_type).into_iter().flatten().collect();
        out.extend(self.filters.get("*").into_iter().flatten());
        out
    }
}

pub fn parse_subscription(value: &Value, known_topics: &[String]) -> Result<ParsedSubscription, NotifyError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| NotifyError::InvalidSubscription("missing id".into()))?
        .to_string();

    let topic_url = value
        .get("topic")
        .and_then(Value::as_str)
        .ok_or_else(|| NotifyError::InvalidSubscription(format!("{id}: missing topic")))?
        .to_string();
    if !known_topics.iter().any(|t| t == &topic_url) {
        return Err(NotifyError::UnknownTopic(topic_url));
    }

    let channel_type = value.get("channelType");
    let channel_code = channel_type
        .and_then(|c| c.get("code"))
        .and_then(Value::as_str)
        .ok_or_else(|| NotifyError::InvalidSubscription(format!("{id}: missing channelType.code")))?
        .to_string();
    let channel_system = channel_type.and_then(|c| c.get("system")).and_then(Value::as_str).map(str::to_string);

    let content_level = value
        .get("content")
        .and_then(Value::as_str)
        .and_then(ContentLevel::parse)
        .unwrap_or(ContentLevel::IdOnly);

    let current_status = value
        .get("status")
        .and_then(Value::as_str)
        .and_then(SubscriptionStatus::parse)
        .unwrap_or(SubscriptionStatus::Requested);

    let mut filters: FilterMap = HashMap::new();
    for entry in value.get("filterBy").and_then(Value::as_array).into_iter().flatten() {
        let Some(filter_parameter) = entry.get("filterParameter").and_then(Value::as_str) else { continue };
        let Some(filter_value) = entry.get("value").and_then(Value::as_str) else { continue };
        let resource_type = entry.get("resourceType").and_then(Value::as_str).map(str::to_string);
        let key = resource_type.clone().unwrap_or_else(|| "*".to_string());
        filters.entry(key).or_default().push(FilterSpec {
            resource_type,
            filter_parameter: filter_parameter.to_string(),
            comparator: entry.get("comparator").and_then(Value::as_str).map(str::to_string),
            modifier: entry.get("modifier").and_then(Value::as_str).map(str::to_string),
            value: filter_value.to_string(),
        });
    }

    let mut parameters: HashMap<String, Vec<String>> = HashMap::new();
    for param in value.get("parameter").and_then(Value::as_array).into_iter().flatten() {
        let Some(name) = param.get("name").and_then(Value::as_str) else { continue };
        let Some(v) = param.get("value").and_then(Value::as_str) else { continue };
        parameters.entry(name.to_string()).or_default().push(v.to_string());
    }

    Ok(ParsedSubscription {
        id,
        topic_url,
        channel_system,
        channel_code,
        endpoint: value.get("endpoint").and_then(Value::as_str).map(str::to_string),
        heartbeat_seconds: value.get("heartbeatPeriod").and_then(Value::as_u64).map(|n| n as u32),
        timeout_seconds: value.get("timeout").and_then(Value::as_u64).map(|n| n as u32),
        content_type: value.get("contentType").and_then(Value::as_str).map(str::to_string),
        content_level,
        max_events_per_notification: value.get("maxCount").and_then(Value::as_u64).map(|n| n as u32),
        parameters,
        filters,
        current_status,
        current_event_count: 0,
        generated_events: EventLog::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sub() -> Value {
        json!({
            "resourceType": "Subscription",
            "id": "sub1",
            "status": "requested",
            "topic": "http://example.org/SubscriptionTopic/encounter-finished",
            "channelType": {"code": "rest-hook"},
            "endpoint": "https://example.org/hook",
            "content": "full-resource"
        })
    }

    #[test]
    fn parses_a_rest_hook_subscription() {
        let known = vec!["http://example.org/SubscriptionTopic/encounter-finished".to_string()];
        let parsed = parse_subscription(&sub(), &known).unwrap();
        assert_eq!(parsed.channel_code, "rest-hook");
        assert_eq!(parsed.content_level, ContentLevel::FullResource);
        assert_eq!(parsed.current_event_count, 0);
    }

    #[test]
    fn rejects_unknown_topic() {
        let err = parse_subscription(&sub(), &[]).unwrap_err();
        assert!(matches!(err, NotifyError::UnknownTopic(_)));
    }

    #[test]
    fn next_event_number_starts_at_one() {
        let known = vec!["http://example.org/SubscriptionTopic/encounter-finished".to_string()];
        let parsed = parse_subscription(&sub(), &known).unwrap();
        assert_eq!(parsed.next_event_number(), 1);
    }
}
