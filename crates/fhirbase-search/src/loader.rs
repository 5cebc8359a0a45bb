//! Parsing FHIR `SearchParameter` resources into the in-process registry.
//!
//! The server ships with common parameters ([`crate::common`]) and loads the
//! rest from a bundle of `SearchParameter` resources supplied at startup
//! (a definitions directory or an embedded package) rather than a remote
//! canonical manager — the in-memory store has no network-resident schema
//! service to query.

use serde_json::Value;

use crate::common::register_common_parameters;
use crate::parameters::{SearchModifier, SearchParameter, SearchParameterType};
use crate::registry::SearchParameterRegistry;

/// Error parsing a `SearchParameter` resource.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("invalid SearchParameter: {0}")]
    InvalidSearchParameter(String),
}

/// Builds a registry seeded with the common parameters, then registers one
/// `SearchParameter` resource per entry in `definitions`. Invalid entries are
/// logged and skipped rather than aborting the whole load.
pub fn load_search_parameters(definitions: &[Value]) -> SearchParameterRegistry {
    let mut registry = SearchParameterRegistry::new();
    register_common_parameters(&mut registry);

    let mut loaded = 0usize;
    let mut skipped = 0usize;
    for value in definitions {
        match parse_search_parameter(value) {
            Ok(param) => {
                tracing::debug!(code = %param.code, base = ?param.base, "loaded search parameter");
                registry.register(param);
                loaded += 1;
            }
            Err(err) => {
                let url = value.get("url").and_then(Value::as_str).unwrap_or("unknown");
                tracing::warn!(url, %err, "skipping invalid SearchParameter");
                skipped += 1;
            }
        }
    }

    tracing::info!(loaded, skipped, total = registry.len(), "search parameter registry ready");
    registry
}

/// Parses a single FHIR `SearchParameter` resource into our internal
/// representation.
pub fn parse_search_parameter(value: &Value) -> Result<SearchParameter, LoaderError> {
    let code = value
        .get("code")
        .and_then(Value::as_str)
        .ok_or_else(|| LoaderError::InvalidSearchParameter("missing 'code'".into()))?
        .to_string();

    let url = value
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| LoaderError::InvalidSearchParameter("missing 'url'".into()))?
        .to_string();

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .and_then(SearchParameterType::parse)
        .ok_or_else(|| LoaderError::InvalidSearchParameter("invalid or missing 'type'".into()))?;

    let base: Vec<String> = value
        .get("base")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    if base.is_empty() {
        return Err(LoaderError::InvalidSearchParameter("missing or empty 'base'".into()));
    }

    let mut param = SearchParameter::new(code, url, kind, base);

    if let Some(expression) = value.get("expression").and_then(Value::as_str) {
        param = param.with_expression(expression);
    }

    let target: Vec<String> = value
        .get("target")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    if !target.is_empty() {
        param = param.with_target_types(target);
    }

    if let Some(description) = value.get("description").and_then(Value::as_str) {
        param = param.with_description(description);
    }

    // `modifier`/`comparator` on the resource describe what the FHIR
    // specification allows for this parameter; we derive the actual
    // compatibility matrix from the parameter's type instead, so they are
    // only checked here for obvious nonsense (an unknown modifier code).
    if let Some(modifiers) = value.get("modifier").and_then(Value::as_array) {
        for m in modifiers {
            let Some(code) = m.as_str() else { continue };
            if SearchModifier::parse(code).is_none() {
                return Err(LoaderError::InvalidSearchParameter(format!("unknown modifier '{code}'")));
            }
        }
    }

    Ok(param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_valid_search_parameter() {
        let value = json!({
            "resourceType": "SearchParameter",
            "url": "http://hl7.org/fhir/SearchParameter/Patient-name",
            "code": "name",
            "type": "string",
            "base": ["Patient"],
            "expression": "Patient.name",
            "description": "A patient's name"
        });

        let param = parse_search_parameter(&value).unwrap();
        assert_eq!(param.code, "name");
        assert_eq!(param.kind, SearchParameterType::String);
        assert_eq!(param.base, vec!["Patient"]);
        assert_eq!(param.expression, "Patient.name");
    }

    #[test]
    fn rejects_missing_code() {
        let value = json!({"url": "http://example.org/sp", "type": "string", "base": ["Patient"]});
        assert!(parse_search_parameter(&value).is_err());
    }

    #[test]
    fn rejects_missing_base() {
        let value = json!({"url": "http://example.org/sp", "code": "test", "type": "string"});
        assert!(parse_search_parameter(&value).is_err());
    }

    #[test]
    fn rejects_invalid_type() {
        let value = json!({"url": "http://example.org/sp", "code": "test", "type": "nope", "base": ["Patient"]});
        assert!(parse_search_parameter(&value).is_err());
    }

    #[test]
    fn loads_common_parameters_plus_supplied_definitions() {
        let definitions = vec![json!({
            "url": "http://hl7.org/fhir/SearchParameter/Patient-name",
            "code": "name",
            "type": "string",
            "base": ["Patient"],
            "expression": "Patient.name"
        })];

        let registry = load_search_parameters(&definitions);
        assert!(registry.get("Patient", "_id").is_some());
        assert!(registry.get("Patient", "name").is_some());
        assert!(registry.get("Observation", "name").is_none());
    }

    #[test]
    fn skips_invalid_definitions_without_failing_the_whole_load() {
        let definitions = vec![json!({"type": "string", "base": ["Patient"]})];
        let registry = load_search_parameters(&definitions);
        assert!(registry.get("Patient", "_id").is_some());
        assert_eq!(registry.count_for_type("Patient") - 8, 0);
    }
}
