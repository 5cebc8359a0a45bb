//! Orchestrates parsing and evaluation against the in-memory store.

use std::sync::Arc;

use fhirbase_memory::InMemoryStorage;
use thiserror::Error;

use crate::evaluator::{self, NullResolver, ReferenceResolver};
use crate::parser::{SearchParameterParser, SearchValidationError};
use crate::registry::SearchParameterRegistry;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub default_count: usize,
    pub max_count: usize,
    pub registry: Arc<SearchParameterRegistry>,
}

impl SearchConfig {
    pub fn new(registry: Arc<SearchParameterRegistry>) -> Self {
        Self { default_count: 10, max_count: 100, registry }
    }

    pub fn with_counts(mut self, default_count: usize, max_count: usize) -> Self {
        self.default_count = default_count;
        self.max_count = max_count;
        self
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] SearchValidationError),
}

/// One matched entry in a search result, with the resolved source of the
/// match (direct hit vs `_include`/`_revinclude` inclusion).
#[derive(Debug, Clone)]
pub struct SearchEntry {
    pub resource: serde_json::Value,
    pub mode: EntryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Match,
    Include,
}

pub struct SearchOutcome {
    pub entries: Vec<SearchEntry>,
    pub total: usize,
}

pub struct SearchEngine;

impl SearchEngine {
    /// Runs a `TypeSearch`: parse the query, resolve it against the
    /// registry, evaluate every live resource of `resource_type`, paginate,
    /// and append `_include`/`_revinclude` entries.
    pub async fn execute(
        storage: &InMemoryStorage,
        resource_type: &str,
        query: &str,
        config: &SearchConfig,
    ) -> Result<SearchOutcome, EngineError> {
        Self::execute_with_resolver(storage, resource_type, query, config, &NullResolver).await
    }

    pub async fn execute_with_resolver(
        storage: &InMemoryStorage,
        resource_type: &str,
        query: &str,
        config: &SearchConfig,
        resolver: &dyn ReferenceResolver,
    ) -> Result<SearchOutcome, EngineError> {
        let parsed = SearchParameterParser::parse_query(query);
        parsed.validate_with_registry(resource_type, &config.registry, config.max_count)?;

        let resolved = parsed.resolve(resource_type, &config.registry);
        let count = parsed.parse_count(config.default_count, config.max_count);
        let offset = parsed.parse_offset(0);

        let mut matched = Vec::new();
        for resource in storage.all_live(resource_type).await {
            let body = resource.as_json();
            if evaluator::matches(&body, &resolved, resolver).await {
                matched.push(body);
            }
        }

        let total = matched.len();
        let page: Vec<SearchEntry> = matched
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|resource| SearchEntry { resource, mode: EntryMode::Match })
            .collect();

        let mut entries = page;
        for include in &resolved.includes {
            for entry in entries.clone() {
                let Some(reference) = entry.resource.get(&include.search_param).and_then(|v| v.get("reference")).and_then(|v| v.as_str()) else { continue };
                let Some((ref_type, ref_id)) = reference.rsplit_once('/') else { continue };
                let ref_type = include.target_type.as_deref().unwrap_or(ref_type);
                if let Some(referent) = resolver.resolve(ref_type, ref_id).await {
                    entries.push(SearchEntry { resource: referent, mode: EntryMode::Include });
                }
            }
        }

        Ok(SearchOutcome { entries, total })
    }
}
