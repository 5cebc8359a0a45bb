//! `TenantStore`: one tenant's versioned FHIR resource store, search
//! evaluation, capability statement, and subscription pipeline.
//!
//! A tenant is the concurrency unit (SPEC §5): distinct tenants share
//! nothing, so everything here is owned, not borrowed from a wider process.
//! Search-parameter registration and capability lookups go through an
//! [`ArcSwap`] for lock-free reads, the same pattern the teacher's search
//! crate uses for `ReloadableSearchConfig` — a writer publishes a whole new
//! registry, readers keep using the one they already loaded until they ask
//! again.

use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use fhirbase_config::TenantConfig;
use fhirbase_core::events::EventBroadcaster;
use fhirbase_core::resource::ResourceEnvelope;
use fhirbase_core::ResourceType;
use fhirbase_memory::InMemoryStorage;
use fhirbase_notify::{NullChannel, RestHookChannel, SubscriptionChannel, SubscriptionEngine};
use fhirbase_search::{
    load_search_parameters, parse_search_parameter, EngineError, SearchConfig, SearchEngine,
    SearchParameterRegistry, SearchParameterParser,
};
use fhirbase_storage::StoreError;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bundle::{self, BundleOutcome};
use crate::capability::build_capability_statement;
use crate::resolver::StorageResolver;
use crate::types::{operation_outcome, InteractionOutcome};

fn extract_resource_type(body: &Value) -> Result<String, StoreError> {
    body.get("resourceType")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| StoreError::malformed_input("missing resourceType field"))
}

fn extract_id(body: &Value) -> Option<String> {
    body.get("id").and_then(Value::as_str).map(String::from)
}

/// One tenant's store: data, search registry, and subscription pipeline.
pub struct TenantStore {
    config: TenantConfig,
    storage: InMemoryStorage,
    registry: ArcSwap<SearchParameterRegistry>,
    engine: SubscriptionEngine,
    broadcaster: Arc<EventBroadcaster>,
    /// Held for the duration of `ProcessBundle(transaction)` — the
    /// whole-tenant exclusivity SPEC §5 requires for transaction bundles.
    bundle_lock: Mutex<()>,
}

impl TenantStore {
    /// Builds a tenant with an empty store, seeded only with the common
    /// search parameters every resource type accepts (`_id`, `_lastUpdated`, ...).
    pub fn new(config: TenantConfig) -> Self {
        Self::with_search_parameters(config, &[])
    }

    /// Builds a tenant, additionally registering `search_parameter_resources`
    /// (FHIR `SearchParameter` resources) at construction — the path a store
    /// host uses to seed a tenant from a packaged definitions bundle.
    pub fn with_search_parameters(config: TenantConfig, search_parameter_resources: &[Value]) -> Self {
        let registry = Arc::new(load_search_parameters(search_parameter_resources));
        let channels: Vec<Arc<dyn SubscriptionChannel>> = if config.channels.is_empty() {
            vec![Arc::new(NullChannel)]
        } else {
            vec![Arc::new(RestHookChannel::new())]
        };

        Self {
            config,
            storage: InMemoryStorage::new(),
            registry: ArcSwap::from(registry.clone()),
            engine: SubscriptionEngine::new(registry, channels),
            broadcaster: EventBroadcaster::new_shared(),
            bundle_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TenantConfig {
        &self.config
    }

    /// Exposes a subscription's live engine-side state (status, event
    /// count) — the part of a `Subscription` that lives in the engine
    /// rather than in the resource body stored for it.
    pub async fn subscription_status(&self, id: &str) -> Option<fhirbase_notify::ParsedSubscription> {
        self.engine.subscription(id).await
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    fn search_config(&self) -> SearchConfig {
        SearchConfig::new(self.registry.load_full())
    }

    fn parse_resource_type(&self, resource_type: &str) -> Result<ResourceType, StoreError> {
        if !self.config.enabled_resource_types.contains(resource_type) {
            return Err(StoreError::unsupported_type(resource_type));
        }
        ResourceType::from_str(resource_type).map_err(|_| StoreError::unsupported_type(resource_type))
    }

    /// Re-registers a `SearchParameter` body into a fresh registry and
    /// publishes it — the "invalidate and rebuild on next read" eventual
    /// consistency SPEC §5 calls for.
    async fn register_search_parameter(&self, body: &Value) -> Result<(), StoreError> {
        let param = parse_search_parameter(body)
            .map_err(|e| StoreError::invariant(format!("invalid SearchParameter: {e}")))?;
        let mut next = (*self.registry.load_full()).clone();
        next.register(param);
        self.registry.store(Arc::new(next));
        Ok(())
    }

    async fn ingest_special_resource(&self, resource_type: &str, body: &Value) -> Result<(), StoreError> {
        match resource_type {
            "SearchParameter" => self.register_search_parameter(body).await?,
            "SubscriptionTopic" => self
                .engine
                .register_topic(body)
                .await
                .map_err(|e| StoreError::invariant(e.to_string()))?,
            "Subscription" => self
                .engine
                .register_subscription(body)
                .await
                .map_err(|e| StoreError::invariant(e.to_string()))?,
            _ => {}
        }
        Ok(())
    }

    async fn notify(&self, event: fhirbase_core::events::ResourceEvent) {
        self.broadcaster.send_resource(event.clone());
        let resolver = StorageResolver::new(&self.storage);
        match self.engine.on_event_with_resolver(&event, &resolver).await {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    debug!(
                        subscription = %outcome.subscription_id,
                        event_number = outcome.event_number,
                        delivered = outcome.delivered,
                        "subscription notification fired"
                    );
                }
            }
            Err(err) => tracing::warn!(%err, "subscription trigger evaluation failed"),
        }
    }

    // ---- §4.5 Versioned FHIR store interactions ----

    pub fn get_metadata(&self) -> InteractionOutcome {
        let registry = self.registry.load_full();
        let statement = build_capability_statement(&self.config, &registry);
        InteractionOutcome::new(200).with_resource(statement)
    }

    pub async fn instance_create(
        &self,
        resource_type: &str,
        mut body: Value,
        if_none_exist: Option<&str>,
        allow_existing_id: bool,
    ) -> Result<InteractionOutcome, StoreError> {
        let rt = self.parse_resource_type(resource_type)?;

        if let Some(query) = if_none_exist {
            if !query.is_empty() {
                let outcome = SearchEngine::execute(&self.storage, resource_type, query, &self.search_config())
                    .await
                    .map_err(engine_error_to_store)?;
                match outcome.entries.len() {
                    0 => {}
                    1 => {
                        let existing = outcome.entries.into_iter().next().unwrap().resource;
                        let etag = existing
                            .get("meta")
                            .and_then(|m| m.get("versionId"))
                            .and_then(Value::as_str)
                            .map(|v| format!("W/\"{v}\""))
                            .unwrap_or_default();
                        return Ok(InteractionOutcome::new(200).with_resource(existing).with_etag(etag));
                    }
                    _ => {
                        return Ok(InteractionOutcome::new(412).with_outcome(operation_outcome(
                            "error",
                            "multiple-matches",
                            &format!("ifNoneExist query '{query}' matched more than one resource"),
                        )))
                    }
                }
            }
        }

        let id = match extract_id(&body) {
            Some(id) if allow_existing_id => id,
            _ => fhirbase_core::generate_id(),
        };
        fhirbase_core::validate_id(&id).map_err(|e| StoreError::malformed_input(e.to_string()))?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }

        let envelope = ResourceEnvelope::new(rt.clone(), id.clone(), body.clone());
        self.storage
            .insert(&rt, envelope.clone())
            .await
            .map_err(|_| StoreError::conflict(format!("{resource_type}/{id} already exists")))?;

        self.ingest_special_resource(resource_type, &envelope.as_json()).await?;
        self.notify(fhirbase_core::events::ResourceEvent::created(
            resource_type,
            &id,
            envelope.as_json(),
        ).with_version(envelope.meta.version_id.0))
        .await;

        info!(resource_type, id = %id, version_id = %envelope.meta.version_id, "instance created");

        Ok(InteractionOutcome::new(201)
            .with_resource(envelope.as_json())
            .with_etag(envelope.etag())
            .with_last_modified(envelope.meta.last_updated.to_string())
            .with_location(envelope.location()))
    }

    pub async fn instance_read(
        &self,
        resource_type: &str,
        id: &str,
        if_none_match: Option<&str>,
    ) -> Result<InteractionOutcome, StoreError> {
        let rt = self.parse_resource_type(resource_type)?;
        let envelope = self
            .storage
            .get(&rt, id)
            .await
            .ok_or_else(|| StoreError::not_found(resource_type, id))?;

        if if_none_match == Some(envelope.etag().as_str()) {
            return Ok(InteractionOutcome::new(304).with_etag(envelope.etag()));
        }

        Ok(InteractionOutcome::new(200)
            .with_resource(envelope.as_json())
            .with_etag(envelope.etag())
            .with_last_modified(envelope.meta.last_updated.to_string()))
    }

    pub async fn instance_update(
        &self,
        resource_type: &str,
        id: &str,
        mut body: Value,
        if_match: Option<&str>,
        allow_create: bool,
    ) -> Result<InteractionOutcome, StoreError> {
        let rt = self.parse_resource_type(resource_type)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.to_string()));
        }

        let current = self.storage.get(&rt, id).await;

        if current.is_none() {
            if !allow_create {
                return Err(StoreError::not_found(resource_type, id));
            }
            let envelope = ResourceEnvelope::new(rt.clone(), id.to_string(), body.clone());
            self.storage
                .insert(&rt, envelope.clone())
                .await
                .map_err(|_| StoreError::conflict(format!("{resource_type}/{id} already exists")))?;
            self.ingest_special_resource(resource_type, &envelope.as_json()).await?;
            self.notify(fhirbase_core::events::ResourceEvent::created(
                resource_type,
                id,
                envelope.as_json(),
            ))
            .await;
            return Ok(InteractionOutcome::new(201)
                .with_resource(envelope.as_json())
                .with_etag(envelope.etag())
                .with_last_modified(envelope.meta.last_updated.to_string())
                .with_location(envelope.location()));
        }

        let current = current.unwrap();
        if let Some(expected) = if_match {
            let actual = current.etag();
            if actual != expected {
                return Err(StoreError::precondition_failed(expected, actual));
            }
        }
        let previous_json = current.as_json();

        let mut meta = current.meta;
        meta.bump();
        let envelope = ResourceEnvelope::new(rt.clone(), id.to_string(), body.clone()).with_meta(meta);

        self.storage
            .append(&rt, id, fhirbase_memory::HistoryRecord::Live(envelope.clone()))
            .await;

        self.ingest_special_resource(resource_type, &envelope.as_json()).await?;
        self.notify(
            fhirbase_core::events::ResourceEvent::updated(resource_type, id, envelope.as_json())
                .with_previous(previous_json)
                .with_version(envelope.meta.version_id.0),
        )
        .await;

        info!(resource_type, id, version_id = %envelope.meta.version_id, "instance updated");

        Ok(InteractionOutcome::new(200)
            .with_resource(envelope.as_json())
            .with_etag(envelope.etag())
            .with_last_modified(envelope.meta.last_updated.to_string())
            .with_location(envelope.location()))
    }

    pub async fn instance_delete(&self, resource_type: &str, id: &str) -> Result<InteractionOutcome, StoreError> {
        let rt = self.parse_resource_type(resource_type)?;
        let Some(current) = self.storage.get(&rt, id).await else {
            // Idempotent: deleting an absent resource still succeeds.
            return Ok(InteractionOutcome::new(204));
        };

        let version_id = current.meta.version_id.next();
        let last_updated = fhirbase_core::now_utc();
        self.storage
            .append(
                &rt,
                id,
                fhirbase_memory::HistoryRecord::Deleted {
                    resource_type: rt.clone(),
                    id: id.to_string(),
                    version_id,
                    last_updated,
                },
            )
            .await;

        self.notify(fhirbase_core::events::ResourceEvent::deleted(resource_type, id).with_version(version_id.0))
            .await;

        info!(resource_type, id, version_id = %version_id, "instance deleted");
        Ok(InteractionOutcome::new(204))
    }

    pub async fn type_search(&self, resource_type: &str, query: &str) -> Result<InteractionOutcome, StoreError> {
        self.parse_resource_type(resource_type)?;
        let resolver = StorageResolver::new(&self.storage);
        let outcome = SearchEngine::execute_with_resolver(
            &self.storage,
            resource_type,
            query,
            &self.search_config(),
            &resolver,
        )
        .await
        .map_err(engine_error_to_store)?;

        let bundle = bundle::searchset_bundle(&self.config.base_url, outcome.total, &outcome.entries);
        Ok(InteractionOutcome::new(200).with_resource(bundle))
    }

    pub async fn system_search(&self, query: &str) -> Result<InteractionOutcome, StoreError> {
        let mut all_entries = Vec::new();
        let mut total = 0usize;
        let resolver = StorageResolver::new(&self.storage);
        for resource_type in &self.config.enabled_resource_types {
            let outcome = SearchEngine::execute_with_resolver(
                &self.storage,
                resource_type,
                query,
                &self.search_config(),
                &resolver,
            )
            .await
            .map_err(engine_error_to_store)?;
            total += outcome.total;
            all_entries.extend(outcome.entries);
        }
        let bundle = bundle::searchset_bundle(&self.config.base_url, total, &all_entries);
        Ok(InteractionOutcome::new(200).with_resource(bundle))
    }

    pub async fn type_delete(&self, resource_type: &str, query: &str) -> Result<InteractionOutcome, StoreError> {
        self.parse_resource_type(resource_type)?;
        let outcome = SearchEngine::execute(&self.storage, resource_type, query, &self.search_config())
            .await
            .map_err(engine_error_to_store)?;
        let mut deleted = 0usize;
        for entry in outcome.entries {
            if let Some(id) = entry.resource.get("id").and_then(Value::as_str) {
                self.instance_delete(resource_type, id).await?;
                deleted += 1;
            }
        }
        Ok(InteractionOutcome::new(200).with_outcome(operation_outcome(
            "information",
            "informational",
            &format!("deleted {deleted} matching resource(s)"),
        )))
    }

    pub async fn system_delete(&self, query: &str) -> Result<InteractionOutcome, StoreError> {
        let mut deleted = 0usize;
        let types: Vec<String> = self.config.enabled_resource_types.iter().cloned().collect();
        for resource_type in types {
            let outcome = SearchEngine::execute(&self.storage, &resource_type, query, &self.search_config())
                .await
                .map_err(engine_error_to_store)?;
            for entry in outcome.entries {
                if let Some(id) = entry.resource.get("id").and_then(Value::as_str) {
                    self.instance_delete(&resource_type, id).await?;
                    deleted += 1;
                }
            }
        }
        Ok(InteractionOutcome::new(200).with_outcome(operation_outcome(
            "information",
            "informational",
            &format!("deleted {deleted} matching resource(s)"),
        )))
    }

    /// Minimal `$validate`: structural validity only (`resourceType` present
    /// and matches an enabled type), per SPEC §9's "must succeed minimum".
    pub fn validate(&self, resource_type: &str, body: &Value) -> InteractionOutcome {
        match extract_resource_type(body) {
            Ok(actual) if actual == resource_type && self.config.enabled_resource_types.contains(&actual) => {
                InteractionOutcome::new(200)
                    .with_outcome(operation_outcome("information", "informational", "validation succeeded"))
            }
            Ok(actual) => InteractionOutcome::new(422).with_outcome(operation_outcome(
                "error",
                "invariant",
                &format!("resourceType '{actual}' does not match request type '{resource_type}'"),
            )),
            Err(err) => InteractionOutcome::new(400).with_outcome(operation_outcome(
                "error",
                err.outcome_code(),
                &err.to_string(),
            )),
        }
    }

    pub async fn process_bundle(&self, bundle_type: &str, bundle: &Value) -> Result<BundleOutcome, StoreError> {
        match bundle_type {
            "batch" => bundle::process_batch(self, bundle).await,
            "transaction" => {
                let _guard = self.bundle_lock.lock().await;
                bundle::process_transaction(self, bundle).await
            }
            other => Err(StoreError::malformed_input(format!("unsupported Bundle.type '{other}'"))),
        }
    }

    /// Validates a search query without evaluating it — used by
    /// `$validate`-adjacent tooling and tests; exposed for completeness.
    pub fn validate_query(&self, resource_type: &str, query: &str) -> Result<(), StoreError> {
        let registry = self.registry.load_full();
        SearchParameterParser::parse_query(query)
            .validate_with_registry(resource_type, &registry, self.search_config().max_count)
            .map_err(|e| StoreError::malformed_input(e.to_string()))
    }
}

fn engine_error_to_store(err: EngineError) -> StoreError {
    StoreError::malformed_input(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> TenantConfig {
        TenantConfig::from_toml(
            r#"
route = "default"
base_url = "http://localhost/fhir"
fhir_version = "4.3.0"
enabled_resource_types = ["Patient", "Observation", "Encounter", "SubscriptionTopic", "Subscription", "SearchParameter"]
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_read_round_trips_version_one() {
        let store = TenantStore::new(config());
        let created = store
            .instance_create("Patient", json!({"resourceType": "Patient", "name": [{"family": "Smith"}]}), None, false)
            .await
            .unwrap();
        assert_eq!(created.status, 201);
        assert_eq!(created.etag.as_deref(), Some("W/\"1\""));

        let id = created.resource.unwrap()["id"].as_str().unwrap().to_string();
        let read = store.instance_read("Patient", &id, None).await.unwrap();
        assert_eq!(read.status, 200);
        assert_eq!(read.etag.as_deref(), Some("W/\"1\""));
    }

    #[tokio::test]
    async fn update_bumps_version_and_rejects_stale_if_match() {
        let store = TenantStore::new(config());
        let created = store
            .instance_create("Patient", json!({"resourceType": "Patient"}), None, false)
            .await
            .unwrap();
        let id = created.resource.unwrap()["id"].as_str().unwrap().to_string();

        let stale = store
            .instance_update("Patient", &id, json!({"resourceType": "Patient", "active": true}), Some("W/\"99\""), true)
            .await;
        assert!(matches!(stale, Err(StoreError::PreconditionFailed { .. })));

        let updated = store
            .instance_update("Patient", &id, json!({"resourceType": "Patient", "active": true}), None, true)
            .await
            .unwrap();
        assert_eq!(updated.etag.as_deref(), Some("W/\"2\""));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = TenantStore::new(config());
        let created = store
            .instance_create("Patient", json!({"resourceType": "Patient"}), None, false)
            .await
            .unwrap();
        let id = created.resource.unwrap()["id"].as_str().unwrap().to_string();

        let first = store.instance_delete("Patient", &id).await.unwrap();
        let second = store.instance_delete("Patient", &id).await.unwrap();
        assert_eq!(first.status, 204);
        assert_eq!(second.status, 204);
    }

    #[tokio::test]
    async fn unsupported_resource_type_is_rejected() {
        let store = TenantStore::new(config());
        let err = store
            .instance_create("Medication", json!({"resourceType": "Medication"}), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedType { .. }));
    }

    #[tokio::test]
    async fn if_none_exist_with_existing_match_skips_insert() {
        let store = TenantStore::new(config());
        store
            .instance_create(
                "Patient",
                json!({"resourceType": "Patient", "id": "fixed", "identifier": [{"system": "urn:x", "value": "123"}]}),
                None,
                true,
            )
            .await
            .unwrap();

        let second = store
            .instance_create(
                "Patient",
                json!({"resourceType": "Patient", "identifier": [{"system": "urn:x", "value": "123"}]}),
                Some("_id=fixed"),
                false,
            )
            .await
            .unwrap();
        assert_eq!(second.status, 200);
    }

    #[tokio::test]
    async fn registering_search_parameter_increases_capability_count() {
        let store = TenantStore::new(config());
        let before = store.get_metadata();
        let before_count = before.resource.unwrap()["rest"][0]["resource"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["type"] == "Patient")
            .unwrap()["searchParam"]
            .as_array()
            .unwrap()
            .len();

        store
            .instance_create(
                "SearchParameter",
                json!({
                    "resourceType": "SearchParameter",
                    "url": "urn:test:patient-custom",
                    "code": "custom",
                    "type": "string",
                    "base": ["Patient"],
                    "expression": "Patient.custom",
                }),
                None,
                false,
            )
            .await
            .unwrap();

        let after = store.get_metadata();
        let after_count = after.resource.unwrap()["rest"][0]["resource"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["type"] == "Patient")
            .unwrap()["searchParam"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(after_count, before_count + 1);
    }
}
