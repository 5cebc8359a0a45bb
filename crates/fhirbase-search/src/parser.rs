use crate::parameters::{SearchModifier, SearchParameter, SearchParameterType, SearchPrefix};
use crate::registry::SearchParameterRegistry;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use url::form_urlencoded;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedValue {
    pub prefix: Option<SearchPrefix>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedParam {
    pub name: String,
    pub modifier: Option<SearchModifier>,
    pub values: Vec<ParsedValue>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedParameters {
    pub params: Vec<ParsedParam>,
}

pub struct SearchParameterParser;

impl SearchParameterParser {
    /// Parse an application/x-www-form-urlencoded query string into ParsedParameters
    /// Example: "name:exact=John&_lastUpdated=ge2020-01-01"
    pub fn parse_query(query: &str) -> ParsedParameters {
        let mut result = ParsedParameters::default();
        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
            let (name, modifier) = Self::split_name_and_modifier(k);
            let mut values = Vec::new();
            // Support comma-separated values per FHIR search rules
            for raw_val in v.split(',') {
                let raw_val = raw_val.trim();
                if raw_val.is_empty() {
                    continue;
                }
                let (prefix, remainder) = Self::extract_prefix(raw_val);
                values.push(ParsedValue {
                    prefix,
                    raw: remainder.to_string(),
                });
            }
            result.params.push(ParsedParam {
                name: name.into_owned(),
                modifier,
                values,
            });
        }
        result
    }

    fn split_name_and_modifier(key: Cow<'_, str>) -> (Cow<'_, str>, Option<SearchModifier>) {
        if let Some((name, modifier)) = key.split_once(':') {
            // handle :missing specially; others map to enum variants
            let modifier = match modifier {
                "exact" => Some(SearchModifier::Exact),
                "contains" => Some(SearchModifier::Contains),
                "text" => Some(SearchModifier::Text),
                "in" => Some(SearchModifier::In),
                "not-in" => Some(SearchModifier::NotIn),
                "below" => Some(SearchModifier::Below),
                "above" => Some(SearchModifier::Above),
                "not" => Some(SearchModifier::Not),
                "identifier" => Some(SearchModifier::Identifier),
                "missing" => Some(SearchModifier::Missing),
                other if !other.is_empty() => Some(SearchModifier::Type(other.to_string())),
                _ => None,
            };
            (Cow::Owned(name.to_string()), modifier)
        } else {
            (key, None)
        }
    }

    fn extract_prefix(value: &str) -> (Option<SearchPrefix>, &str) {
        // The longest valid prefixes are two chars, check two, then one
        if value.len() >= 2 {
            let p2 = &value[..2];
            if let Some(prefix) = SearchPrefix::parse(p2) {
                return (Some(prefix), &value[2..]);
            }
        }
        if !value.is_empty() {
            let p1 = &value[..1];
            if let Some(prefix) = SearchPrefix::parse(p1) {
                return (Some(prefix), &value[1..]);
            }
        }
        (None, value)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchValidationError {
    #[error("Unknown search parameter: {0}")]
    UnknownParameter(String),
    #[error("Invalid value for {param}: {message}")]
    InvalidValue { param: String, message: String },
}

impl ParsedParameters {
    /// Validate parameters against a basic allow-list and constraints.
    pub fn validate(
        &self,
        allowed_params: &[&str],
        allowed_sort_fields: &[&str],
        max_count: usize,
    ) -> Result<(), SearchValidationError> {
        // Unknown params
        for p in &self.params {
            if !allowed_params.contains(&p.name.as_str()) {
                return Err(SearchValidationError::UnknownParameter(p.name.clone()));
            }
        }
        // _count must be positive integer within max
        if let Some(p) = self.params.iter().find(|p| p.name == "_count")
            && let Some(v) = p.values.first()
        {
            if let Ok(n) = v.raw.parse::<usize>() {
                if n == 0 {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_count".to_string(),
                        message: "must be >= 1".to_string(),
                    });
                }
                if n > max_count {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_count".to_string(),
                        message: format!("exceeds maximum of {max_count}"),
                    });
                }
            } else {
                return Err(SearchValidationError::InvalidValue {
                    param: "_count".to_string(),
                    message: "must be a positive integer".to_string(),
                });
            }
        }
        // _offset must be non-negative integer (usize)
        if let Some(p) = self.params.iter().find(|p| p.name == "_offset")
            && let Some(v) = p.values.first()
            && v.raw.parse::<usize>().is_err()
        {
            return Err(SearchValidationError::InvalidValue {
                param: "_offset".to_string(),
                message: "must be a non-negative integer".to_string(),
            });
        }
        // _sort field must be in allowed list if present
        if let Some(p) = self.params.iter().find(|p| p.name == "_sort") {
            if let Some(v) = p.values.first() {
                let mut field = v.raw.as_str();
                if let Some(stripped) = field.strip_prefix('-') {
                    field = stripped;
                }
                if field.is_empty() || !allowed_sort_fields.contains(&field) {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_sort".to_string(),
                        message: format!(
                            "unsupported sort field '{}'; allowed: {}",
                            field,
                            allowed_sort_fields.join(", ")
                        ),
                    });
                }
            } else {
                return Err(SearchValidationError::InvalidValue {
                    param: "_sort".to_string(),
                    message: "missing sort field value".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Parse the optional _count parameter with defaults and clamping.
    /// Returns an effective count value within [1..=max]. If missing/invalid, returns `default_`.
    pub fn parse_count(&self, default_: usize, max: usize) -> usize {
        // find first occurrence of _count
        if let Some(p) = self.params.iter().find(|p| p.name == "_count")
            && let Some(v) = p.values.first()
            && let Ok(n) = v.raw.parse::<usize>()
        {
            if n == 0 {
                return default_;
            }
            return n.min(max);
        }
        default_
    }

    /// Parse optional _offset parameter; returns default_ if missing/invalid.
    pub fn parse_offset(&self, default_: usize) -> usize {
        if let Some(p) = self.params.iter().find(|p| p.name == "_offset")
            && let Some(v) = p.values.first()
            && let Ok(n) = v.raw.parse::<usize>()
        {
            return n;
        }
        default_
    }
}



#[cfg(test)]
mod tests_validation {
    use super::*;

    #[test]
    fn parse_offset_defaults_and_valid() {
        let p = SearchParameterParser::parse_query("");
        assert_eq!(p.parse_offset(0), 0);
        let p = SearchParameterParser::parse_query("_offset=15");
        assert_eq!(p.parse_offset(0), 15);
        let p = SearchParameterParser::parse_query("_offset=abc");
        assert_eq!(p.parse_offset(7), 7);
    }

    #[test]
    fn validate_unknown_param_fails() {
        let parsed = SearchParameterParser::parse_query("foo=bar");
        let allowed = [
            "_id",
            "_lastUpdated",
            "_count",
            "_offset",
            "_sort",
            "identifier",
            "name",
            "family",
            "given",
        ];
        let allowed_sort = ["_id", "_lastUpdated"];
        let err = parsed.validate(&allowed, &allowed_sort, 100).unwrap_err();
        match err {
            SearchValidationError::UnknownParameter(p) => assert_eq!(p, "foo"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn validate_count_and_sort_rules() {
        let allowed = [
            "_id",
            "_lastUpdated",
            "_count",
            "_offset",
            "_sort",
            "identifier",
            "name",
            "family",
            "given",
        ];
        let allowed_sort = ["_id", "_lastUpdated"];
        // invalid _count
        let p = SearchParameterParser::parse_query("_count=0");
        assert!(p.validate(&allowed, &allowed_sort, 100).is_err());
        let p = SearchParameterParser::parse_query("_count=abc");
        assert!(p.validate(&allowed, &allowed_sort, 100).is_err());
        let p = SearchParameterParser::parse_query("_count=1000");
        assert!(p.validate(&allowed, &allowed_sort, 100).is_err());
        // invalid _offset
        let p = SearchParameterParser::parse_query("_offset=-1");
        assert!(p.validate(&allowed, &allowed_sort, 100).is_err());
        // invalid _sort field
        let p = SearchParameterParser::parse_query("_sort=foo");
        assert!(p.validate(&allowed, &allowed_sort, 100).is_err());
        // valid case
        let p = SearchParameterParser::parse_query("_sort=-_id&_count=5");
        assert!(p.validate(&allowed, &allowed_sort, 100).is_ok());
    }
}

// ============================================================================
// Registry-Based Parameter Validation and Filter Building
// ============================================================================

/// Control parameters that are always allowed (not resource-specific)
pub const CONTROL_PARAMS: &[&str] = &[
    "_count",
    "_offset",
    "_sort",
    "_include",
    "_revinclude",
    "_summary",
    "_elements",
    "_total",
    "_contained",
    "_containedType",
];

impl ParsedParameters {
    /// Validate parameters using the search parameter registry.
    ///
    /// Checks that each parameter either:
    /// - Is a control parameter (e.g., _count, _offset, _sort)
    /// - Exists in the registry for the given resource type
    pub fn validate_with_registry(
        &self,
        resource_type: &str,
        registry: &SearchParameterRegistry,
        max_count: usize,
    ) -> Result<(), SearchValidationError> {
        // Validate each parameter
        for p in &self.params {
            // Allow control parameters
            if CONTROL_PARAMS.contains(&p.name.as_str()) {
                continue;
            }

            // `_has:...` reverse chains are parsed structurally but not
            // evaluated; don't reject them as unknown.
            if p.name.starts_with("_has:") {
                continue;
            }

            // A chained parameter (`subject.name`) is validated on its head
            // segment; the tail is resolved against the referent's own type.
            let head = p.name.split('.').next().unwrap_or(&p.name);

            // Check if parameter exists in registry for this resource type
            if registry.get(resource_type, head).is_none() {
                return Err(SearchValidationError::UnknownParameter(p.name.clone()));
            }
        }

        // Validate _count constraints
        if let Some(p) = self.params.iter().find(|p| p.name == "_count")
            && let Some(v) = p.values.first()
        {
            if let Ok(n) = v.raw.parse::<usize>() {
                if n == 0 {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_count".to_string(),
                        message: "must be >= 1".to_string(),
                    });
                }
                if n > max_count {
                    return Err(SearchValidationError::InvalidValue {
                        param: "_count".to_string(),
                        message: format!("exceeds maximum of {max_count}"),
                    });
                }
            } else {
                return Err(SearchValidationError::InvalidValue {
                    param: "_count".to_string(),
                    message: "must be a positive integer".to_string(),
                });
            }
        }

        // Validate _offset
        if let Some(p) = self.params.iter().find(|p| p.name == "_offset")
            && let Some(v) = p.values.first()
            && v.raw.parse::<usize>().is_err()
        {
            return Err(SearchValidationError::InvalidValue {
                param: "_offset".to_string(),
                message: "must be a non-negative integer".to_string(),
            });
        }

        Ok(())
    }
}

/// A search directive resolved against the registry: a parameter bound to
/// its definition, with any chained or composite children nested
/// structurally. This is what the evaluator walks.
#[derive(Debug, Clone)]
pub struct ParsedSearchParameter {
    pub definition: Arc<SearchParameter>,
    pub modifier: Option<SearchModifier>,
    pub values: Vec<ParsedValue>,
    /// Set for a dotted key like `subject.name`: the nested parameter to
    /// evaluate against the resolved referent, keyed by each candidate
    /// target resource type (a chain may be ambiguous until the referent's
    /// actual type is known).
    pub chain: Option<Box<ChainedParameter>>,
    /// Set when the raw value contained `$`-separated components: one
    /// nested parameter per composite sub-expression, all matched against
    /// the same root element (AND semantics).
    pub composite_children: Vec<ParsedSearchParameter>,
}

#[derive(Debug, Clone)]
pub struct ChainedParameter {
    /// Explicit target type from a `subject:Patient.name` modifier, if any.
    pub target_type: Option<String>,
    pub name: String,
    pub modifier: Option<SearchModifier>,
    pub values: Vec<ParsedValue>,
}

/// An `_include`/`_revinclude` directive: `ResourceType:searchParam[:targetType]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub source_type: String,
    pub search_param: String,
    pub target_type: Option<String>,
    pub iterate: bool,
}

impl IncludeDirective {
    fn parse(raw: &str, iterate: bool) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let source_type = parts.next()?.to_string();
        let search_param = parts.next()?.to_string();
        let target_type = parts.next().map(str::to_string);
        Some(Self { source_type, search_param, target_type, iterate })
    }
}

/// The outcome of resolving a [`ParsedParameters`] against a registry for a
/// specific resource type: the parameters the evaluator should run, plus the
/// control directives that shape the resulting bundle.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSearch {
    pub parameters: Vec<ParsedSearchParameter>,
    pub includes: Vec<IncludeDirective>,
    pub rev_includes: Vec<IncludeDirective>,
    /// Names of `_has:` directives present in the query. Parsed structurally
    /// but not evaluated; the caller should surface these as unsupported
    /// rather than silently ignoring them if precision matters to the
    /// consumer.
    pub ignored_has: Vec<String>,
}

impl ParsedParameters {
    /// Resolves every parameter against `registry` for `resource_type`,
    /// splitting chains on `.`, composite values on `$`, and routing
    /// `_include`/`_revinclude`/`_has` into their own buckets rather than
    /// the evaluated parameter list.
    pub fn resolve(&self, resource_type: &str, registry: &SearchParameterRegistry) -> ResolvedSearch {
        let mut resolved = ResolvedSearch::default();

        for p in &self.params {
            if CONTROL_PARAMS.contains(&p.name.as_str()) {
                match p.name.as_str() {
                    "_include" => {
                        for v in &p.values {
                            if let Some(d) = IncludeDirective::parse(&v.raw, p.modifier == Some(SearchModifier::Type("iterate".into()))) {
                                resolved.includes.push(d);
                            }
                        }
                    }
                    "_revinclude" => {
                        for v in &p.values {
                            if let Some(d) = IncludeDirective::parse(&v.raw, p.modifier == Some(SearchModifier::Type("iterate".into()))) {
                                resolved.rev_includes.push(d);
                            }
                        }
                    }
                    _ => {}
                }
                continue;
            }

            if let Some(has_target) = p.name.strip_prefix("_has:") {
                resolved.ignored_has.push(has_target.to_string());
                continue;
            }

            if let Some((head, tail)) = p.name.split_once('.') {
                let Some(definition) = registry.get(resource_type, head) else { continue };
                let target_type = match &p.modifier {
                    Some(SearchModifier::Type(t)) => Some(t.clone()),
                    _ => definition.target_types.first().cloned(),
                };
                resolved.parameters.push(ParsedSearchParameter {
                    definition,
                    modifier: None,
                    values: Vec::new(),
                    chain: Some(Box::new(ChainedParameter {
                        target_type,
                        name: tail.to_string(),
                        modifier: None,
                        values: p.values.clone(),
                    })),
                    composite_children: Vec::new(),
                });
                continue;
            }

            let Some(definition) = registry.get(resource_type, &p.name) else { continue };

            if definition.kind == SearchParameterType::Composite {
                let mut composite_children = Vec::new();
                for v in &p.values {
                    for (idx, component) in v.raw.split('$').enumerate() {
                        composite_children.push(ParsedSearchParameter {
                            definition: definition.clone(),
                            modifier: None,
                            values: vec![ParsedValue { prefix: v.prefix, raw: component.to_string() }],
                            chain: None,
                            composite_children: Vec::new(),
                        });
                        let _ = idx;
                    }
                }
                resolved.parameters.push(ParsedSearchParameter {
                    definition,
                    modifier: p.modifier.clone(),
                    values: Vec::new(),
                    chain: None,
                    composite_children,
                });
                continue;
            }

            resolved.parameters.push(ParsedSearchParameter {
                definition,
                modifier: p.modifier.clone(),
                values: p.values.clone(),
                chain: None,
                composite_children: Vec::new(),
            });
        }

        resolved
    }
}

#[cfg(test)]
mod tests_resolve {
    use super::*;
    use crate::parameters::SearchParameterType;

    fn registry_with_patient_name_and_subject() -> SearchParameterRegistry {
        let mut registry = SearchParameterRegistry::new();
        crate::common::register_common_parameters(&mut registry);
        registry.register(SearchParameter::new(
            "name",
            "urn:test:Patient-name",
            SearchParameterType::String,
            vec!["Patient".to_string()],
        ).with_expression("Patient.name"));
        registry.register(
            SearchParameter::new(
                "subject",
                "urn:test:Observation-subject",
                SearchParameterType::Reference,
                vec!["Observation".to_string()],
            )
            .with_expression("Observation.subject")
            .with_target_types(vec!["Patient".to_string()]),
        );
        registry
    }

    #[test]
    fn resolves_a_simple_parameter() {
        let registry = registry_with_patient_name_and_subject();
        let parsed = SearchParameterParser::parse_query("name=Smith");
        let resolved = parsed.resolve("Patient", &registry);
        assert_eq!(resolved.parameters.len(), 1);
        assert_eq!(resolved.parameters[0].definition.code, "name");
    }

    #[test]
    fn chained_parameter_nests_a_child() {
        let registry = registry_with_patient_name_and_subject();
        let parsed = SearchParameterParser::parse_query("subject.name=Smith");
        let resolved = parsed.resolve("Observation", &registry);
        assert_eq!(resolved.parameters.len(), 1);
        let chain = resolved.parameters[0].chain.as_ref().unwrap();
        assert_eq!(chain.name, "name");
        assert_eq!(chain.target_type.as_deref(), Some("Patient"));
    }

    #[test]
    fn has_directive_is_recorded_but_not_evaluated() {
        let registry = registry_with_patient_name_and_subject();
        let parsed = SearchParameterParser::parse_query("_has:Observation:subject:status=final");
        let resolved = parsed.resolve("Patient", &registry);
        assert!(resolved.parameters.is_empty());
        assert_eq!(resolved.ignored_has, vec!["Observation:subject:status".to_string()]);
    }

    #[test]
    fn include_directive_is_parsed() {
        let registry = registry_with_patient_name_and_subject();
        let parsed = SearchParameterParser::parse_query("_include=Observation:subject");
        let resolved = parsed.resolve("Observation", &registry);
        assert_eq!(resolved.includes.len(), 1);
        assert_eq!(resolved.includes[0].source_type, "Observation");
        assert_eq!(resolved.includes[0].search_param, "subject");
    }
}
