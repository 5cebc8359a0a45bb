//! In-memory search evaluator.
//!
//! Walks a resource's JSON body with a lightweight path navigator (not a
//! full FHIRPath engine — see the crate's module docs) and decides
//! match/no-match for a [`crate::parser::ResolvedSearch`] against it.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::parameters::{SearchModifier, SearchParameter, SearchParameterType, SearchPrefix};
use crate::parser::{ParsedSearchParameter, ParsedValue, ResolvedSearch};

/// Resolves a chained parameter's reference to the referent resource. The
/// evaluator is storage-agnostic; the caller (the `fhirbase` crate's
/// interaction router) supplies this so chaining can look the referent up
/// in the same tenant's store.
pub trait ReferenceResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        resource_type: &'a str,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Value>> + Send + 'a>>;
}

/// A resolver that never resolves anything; chained parameters always fail
/// to match. Useful for evaluating parameter-less or chain-free queries
/// without threading a real store through.
pub struct NullResolver;

impl ReferenceResolver for NullResolver {
    fn resolve<'a>(&'a self, _resource_type: &'a str, _id: &'a str) -> Pin<Box<dyn Future<Output = Option<Value>> + Send + 'a>> {
        Box::pin(async { None })
    }
}

/// Evaluates every resolved parameter against `resource`. AND across
/// parameters; OR across the values and extracted elements within one
/// parameter, per the routing-key dispatch described in the search
/// evaluator design.
pub async fn matches(resource: &Value, resolved: &ResolvedSearch, resolver: &dyn ReferenceResolver) -> bool {
    for param in &resolved.parameters {
        if !matches_one(resource, param, resolver).await {
            return false;
        }
    }
    true
}

async fn matches_one(resource: &Value, param: &ParsedSearchParameter, resolver: &dyn ReferenceResolver) -> bool {
    if let Some(chain) = &param.chain {
        return matches_chain(resource, param, chain, resolver).await;
    }

    if !param.composite_children.is_empty() {
        let roots = extract_elements(resource, &param.definition.expression);
        if roots.is_empty() {
            return false;
        }
        return roots.iter().any(|root| {
            param
                .composite_children
                .iter()
                .all(|child| matches_against_element(root, &child.definition, child.modifier.as_ref(), &child.values))
        });
    }

    matches_against_resource(resource, &param.definition, param.modifier.as_ref(), &param.values)
}

async fn matches_chain(
    resource: &Value,
    param: &ParsedSearchParameter,
    chain: &crate::parser::ChainedParameter,
    resolver: &dyn ReferenceResolver,
) -> bool {
    let elements = extract_elements(resource, &param.definition.expression);
    for element in elements {
        let Some((ref_type, ref_id)) = parse_reference(&element) else { continue };
        let target_type = chain.target_type.as_deref().unwrap_or(ref_type.as_str());
        if target_type != ref_type && !param.definition.target_types.is_empty() {
            continue;
        }
        let Some(referent) = resolver.resolve(&ref_type, &ref_id).await else { continue };
        // The chained name resolves against the referent's own registry
        // entry; without a registry handle here we fall back to treating
        // the chain's expression as a direct JSON field on the referent,
        // which covers the common single-level `subject.name` case.
        if json_contains_case_insensitive(&referent, &chain.name, &chain.values) {
            return true;
        }
    }
    false
}

fn json_contains_case_insensitive(value: &Value, field: &str, values: &[ParsedValue]) -> bool {
    let Some(found) = value.get(field) else { return false };
    let haystacks = flatten_strings(found);
    values.iter().any(|v| {
        haystacks
            .iter()
            .any(|h| h.to_lowercase().starts_with(&v.raw.to_lowercase()))
    })
}

fn flatten_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(flatten_strings).collect(),
        Value::Object(map) => map.values().flat_map(flatten_strings).collect(),
        _ => Vec::new(),
    }
}

fn matches_against_resource(
    resource: &Value,
    definition: &SearchParameter,
    modifier: Option<&SearchModifier>,
    values: &[ParsedValue],
) -> bool {
    let elements = extract_elements(resource, &definition.expression);

    if matches!(modifier, Some(SearchModifier::Missing)) {
        return matches_missing(&elements, values);
    }

    if elements.is_empty() {
        return false;
    }

    elements.iter().any(|el| matches_against_element(el, definition, modifier, values))
}

fn matches_against_element(
    element: &Value,
    definition: &SearchParameter,
    modifier: Option<&SearchModifier>,
    values: &[ParsedValue],
) -> bool {
    values.iter().any(|qv| dispatch(element, definition.kind, modifier, qv))
}

fn matches_missing(elements: &[Value], values: &[ParsedValue]) -> bool {
    let absent = elements.is_empty();
    values.iter().any(|v| {
        let wants_true = v.raw.starts_with('t');
        let wants_false = v.raw.starts_with('f');
        (wants_true && absent) || (wants_false && !absent)
    })
}

fn dispatch(element: &Value, kind: SearchParameterType, modifier: Option<&SearchModifier>, value: &ParsedValue) -> bool {
    match kind {
        SearchParameterType::Date => date_matches(element, value),
        SearchParameterType::Number => number_matches(element, value),
        SearchParameterType::Quantity => quantity_matches(element, value),
        SearchParameterType::Reference => reference_matches(element, modifier, value),
        SearchParameterType::String => string_matches(element, modifier, value),
        SearchParameterType::Token => token_matches(element, modifier, value),
        SearchParameterType::Uri => uri_matches(element, value),
        SearchParameterType::Composite | SearchParameterType::Special => false,
    }
}

// --- element navigation -----------------------------------------------

/// Walks `expression` (a dotted FHIRPath-like path, e.g. "Patient.name.family")
/// against `resource`, dropping the leading resource-type segment and
/// flattening arrays as it goes. This is a simplified, JSON-shape navigator,
/// not a FHIRPath engine: it does not evaluate `.where()`, `.ofType()`, or
/// `|`-unions, which is an accepted limitation for this evaluator.
pub fn extract_elements(resource: &Value, expression: &str) -> Vec<Value> {
    let segments: Vec<&str> = expression.split('.').collect();
    let segments = if segments.first().map(|s| s.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)).unwrap_or(false) {
        &segments[1..]
    } else {
        &segments[..]
    };

    let mut current = vec![resource.clone()];
    for segment in segments {
        let segment = segment.trim_end_matches("[x]");
        if segment.is_empty() {
            continue;
        }
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Array(items) => {
                    for item in items {
                        if let Some(found) = item.get(segment) {
                            push_flattened(found.clone(), &mut next);
                        }
                    }
                }
                other => {
                    if let Some(found) = other.get(segment) {
                        push_flattened(found.clone(), &mut next);
                    }
                }
            }
        }
        current = next;
    }
    current
}

fn push_flattened(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => out.extend(items),
        Value::Null => {}
        other => out.push(other),
    }
}

/// A best-effort classification of a resolved element's FHIR shape, used
/// only for documentation/debugging; match dispatch itself is driven by the
/// parameter's declared [`SearchParameterType`], not this hint.
pub fn element_type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Object(map) => {
            if map.contains_key("reference") {
                "reference"
            } else if map.contains_key("coding") {
                "codeableconcept"
            } else if map.contains_key("system") && map.contains_key("code") {
                "coding"
            } else if map.contains_key("value") && map.contains_key("unit") {
                "quantity"
            } else if map.contains_key("family") || map.contains_key("given") {
                "humanname"
            } else if map.contains_key("line") || map.contains_key("city") {
                "address"
            } else {
                "object"
            }
        }
        _ => "unknown",
    }
}

// --- type-specific matchers ---------------------------------------------

fn date_matches(element: &Value, value: &ParsedValue) -> bool {
    let Some(raw) = element.as_str() else { return false };
    let Some((value_start, value_end)) = parse_date_window(raw) else { return false };
    let Some((query_start, query_end)) = parse_date_window(&value.raw) else { return false };

    match value.prefix.unwrap_or(SearchPrefix::Eq) {
        SearchPrefix::Eq => value_start >= query_start && value_end <= query_end,
        SearchPrefix::Ne => !(value_start == query_start && value_end == query_end),
        SearchPrefix::Gt => value_start > query_end,
        SearchPrefix::Lt => value_end < query_start,
        SearchPrefix::Ge => value_start >= query_start,
        SearchPrefix::Le => value_end <= query_end,
        SearchPrefix::Sa => value_start > query_end,
        SearchPrefix::Eb => value_end < query_start,
        SearchPrefix::Ap => (value_start - query_start).abs() <= 86400 && (value_end - query_end).abs() <= 86400,
    }
}

/// Parses a FHIR date/dateTime/instant into a `[start, end]` unix-seconds
/// window sized by its stated precision (year/month/day/full instant).
fn parse_date_window(raw: &str) -> Option<(i64, i64)> {
    use time::format_description::well_known::Rfc3339;
    use time::{Date, Month, OffsetDateTime};

    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        let ts = dt.unix_timestamp();
        return Some((ts, ts));
    }

    let parts: Vec<&str> = raw.split('-').collect();
    match parts.len() {
        1 => {
            let year: i32 = parts[0].parse().ok()?;
            let start = Date::from_calendar_date(year, Month::January, 1).ok()?;
            let end = Date::from_calendar_date(year, Month::December, 31).ok()?;
            Some((
                start.midnight().assume_utc().unix_timestamp(),
                end.midnight().assume_utc().unix_timestamp() + 86399,
            ))
        }
        2 => {
            let year: i32 = parts[0].parse().ok()?;
            let month: u8 = parts[1].parse().ok()?;
            let month = Month::try_from(month).ok()?;
            let start = Date::from_calendar_date(year, month, 1).ok()?;
            let end_day = time::util::days_in_year_month(year, month);
            let end = Date::from_calendar_date(year, month, end_day).ok()?;
            Some((
                start.midnight().assume_utc().unix_timestamp(),
                end.midnight().assume_utc().unix_timestamp() + 86399,
            ))
        }
        3 => {
            let year: i32 = parts[0].parse().ok()?;
            let month: u8 = parts[1].parse().ok()?;
            let day: u8 = parts[2].split('T').next()?.parse().ok()?;
            let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
            let start = date.midnight().assume_utc().unix_timestamp();
            Some((start, start + 86399))
        }
        _ => None,
    }
}

fn number_matches(element: &Value, value: &ParsedValue) -> bool {
    let Some(actual) = element.as_f64() else { return false };
    let Ok(query) = value.raw.parse::<f64>() else { return false };
    compare_numeric(actual, query, value.prefix.unwrap_or(SearchPrefix::Eq), query.abs() * 0.1)
}

fn quantity_matches(element: &Value, value: &ParsedValue) -> bool {
    let Some(obj) = element.as_object() else { return false };
    let Some(actual) = obj.get("value").and_then(Value::as_f64) else { return false };

    let mut parts = value.raw.splitn(3, '|');
    let Ok(query_value) = parts.next().unwrap_or_default().parse::<f64>() else { return false };
    let query_system = parts.next().filter(|s| !s.is_empty());
    let query_code = parts.next().filter(|s| !s.is_empty());

    let actual_system = obj.get("system").and_then(Value::as_str);
    let actual_code = obj.get("code").and_then(Value::as_str).or_else(|| obj.get("unit").and_then(Value::as_str));

    let system_ok = query_system.is_none() || actual_system.is_none() || query_system == actual_system;
    let code_ok = query_code.is_none()
        || actual_code.is_none()
        || query_code.unwrap().eq_ignore_ascii_case(actual_code.unwrap());

    system_ok && code_ok && compare_numeric(actual, query_value, value.prefix.unwrap_or(SearchPrefix::Eq), 1.0)
}

fn compare_numeric(actual: f64, query: f64, prefix: SearchPrefix, ap_tolerance: f64) -> bool {
    match prefix {
        SearchPrefix::Eq => (actual - query).abs() < f64::EPSILON,
        SearchPrefix::Ne => (actual - query).abs() >= f64::EPSILON,
        SearchPrefix::Gt => actual > query,
        SearchPrefix::Lt => actual < query,
        SearchPrefix::Ge => actual >= query,
        SearchPrefix::Le => actual <= query,
        SearchPrefix::Sa => actual > query,
        SearchPrefix::Eb => actual < query,
        SearchPrefix::Ap => (actual - query).abs() <= ap_tolerance.max(1.0),
    }
}

fn parse_reference(element: &Value) -> Option<(String, String)> {
    let reference = element.get("reference")?.as_str()?;
    segment_reference(reference)
}

fn segment_reference(reference: &str) -> Option<(String, String)> {
    if let Some(rest) = reference.strip_prefix("urn:uuid:") {
        return Some(("".to_string(), rest.to_string()));
    }
    if let Some(rest) = reference.strip_prefix("urn:oid:") {
        return Some(("".to_string(), rest.to_string()));
    }
    let (type_part, id_part) = reference.rsplit_once('/')?;
    let type_part = type_part.rsplit('/').next().unwrap_or(type_part);
    Some((type_part.to_string(), id_part.to_string()))
}

fn reference_matches(element: &Value, modifier: Option<&SearchModifier>, value: &ParsedValue) -> bool {
    if matches!(modifier, Some(SearchModifier::Identifier)) {
        let Some(identifier) = element.get("identifier") else { return false };
        return token_matches(identifier, None, value);
    }

    let Some(reference) = element.get("reference").and_then(Value::as_str) else { return false };

    if let Some(SearchModifier::Type(type_name)) = modifier {
        let Some((ref_type, _)) = segment_reference(reference) else { return false };
        if &ref_type != type_name {
            return false;
        }
    }

    let query = &value.raw;
    if reference == query {
        return true;
    }
    if let Some((_, id)) = segment_reference(query) {
        if !query.contains('/') {
            return reference.ends_with(&format!("/{id}")) || reference == id;
        }
    }
    false
}

fn string_matches(element: &Value, modifier: Option<&SearchModifier>, value: &ParsedValue) -> bool {
    let haystacks = string_bearing_fields(element);
    let query = value.raw.to_lowercase();
    haystacks.iter().any(|h| match modifier {
        Some(SearchModifier::Exact) => h == &value.raw,
        Some(SearchModifier::Contains) => h.to_lowercase().contains(&query),
        _ => h.to_lowercase().starts_with(&query),
    })
}

fn string_bearing_fields(element: &Value) -> Vec<String> {
    match element {
        Value::String(s) => vec![s.clone()],
        Value::Object(map) => {
            const NAME_FIELDS: &[&str] = &["family", "text"];
            const GIVEN: &str = "given";
            const ADDRESS_FIELDS: &[&str] = &["use", "type", "line", "city", "district", "state", "postalCode", "country", "text"];
            let mut out = Vec::new();
            for field in NAME_FIELDS.iter().chain(ADDRESS_FIELDS.iter()) {
                if let Some(Value::String(s)) = map.get(*field) {
                    out.push(s.clone());
                }
            }
            if let Some(Value::Array(given)) = map.get(GIVEN) {
                out.extend(given.iter().filter_map(|v| v.as_str().map(String::from)));
            }
            if let Some(Value::Array(lines)) = map.get("line") {
                out.extend(lines.iter().filter_map(|v| v.as_str().map(String::from)));
            }
            out
        }
        _ => Vec::new(),
    }
}

fn token_matches(element: &Value, modifier: Option<&SearchModifier>, value: &ParsedValue) -> bool {
    let inverted = matches!(modifier, Some(SearchModifier::Not));
    let result = token_matches_positive(element, value);
    if inverted { !result } else { result }
}

fn token_matches_positive(element: &Value, value: &ParsedValue) -> bool {
    let mut parts = value.raw.splitn(2, '|');
    let first = parts.next().unwrap_or_default();
    let second = parts.next();
    let (query_system, query_code) = if value.raw.contains('|') {
        (if first.is_empty() { None } else { Some(first) }, second.unwrap_or_default())
    } else {
        (None, first)
    };

    match element {
        Value::Bool(b) => query_code.eq_ignore_ascii_case(&b.to_string()),
        Value::String(s) => s == query_code,
        Value::Object(map) if map.contains_key("coding") => {
            let Some(Value::Array(codings)) = map.get("coding") else { return false };
            codings.iter().any(|c| token_coding_matches(c, query_system, query_code))
        }
        Value::Object(_) => token_coding_matches(element, query_system, query_code),
        _ => false,
    }
}

fn token_coding_matches(coding: &Value, query_system: Option<&str>, query_code: &str) -> bool {
    let actual_system = coding.get("system").and_then(Value::as_str);
    let actual_code = coding
        .get("code")
        .or_else(|| coding.get("value"))
        .and_then(Value::as_str);
    let Some(actual_code) = actual_code else { return false };

    let system_ok = query_system.is_none()
        || actual_system.is_none()
        || query_system.unwrap().eq_ignore_ascii_case(actual_system.unwrap());
    system_ok && actual_code.eq_ignore_ascii_case(query_code)
}

fn uri_matches(element: &Value, value: &ParsedValue) -> bool {
    let Some(actual) = element.as_str() else { return false };
    normalize_uri(actual) == normalize_uri(&value.raw)
}

fn normalize_uri(uri: &str) -> String {
    uri.strip_prefix("urn:oid:")
        .or_else(|| uri.strip_prefix("urn:uuid:"))
        .unwrap_or(uri)
        .to_string()
}
