//! Implementation of [`FhirStorage`] for [`InMemoryStorage`].

use async_trait::async_trait;
use serde_json::Value;

use fhirbase_core::resource::{ResourceEnvelope, VersionId};
use fhirbase_storage::{
    FhirStorage, HistoryEntry, HistoryMethod, HistoryParams, HistoryResult, SearchParams,
    SearchResult, StoreError, StoredResource, Transaction as FhirTransaction,
};

use crate::storage::{parse_resource_type, HistoryRecord, InMemoryStorage};

fn extract_resource_type(resource: &Value) -> Result<String, StoreError> {
    resource
        .get("resourceType")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| StoreError::malformed_input("missing resourceType field"))
}

fn extract_id(resource: &Value) -> Option<String> {
    resource.get("id").and_then(|v| v.as_str()).map(String::from)
}

fn to_stored(envelope: &ResourceEnvelope, resource_type: &str) -> StoredResource {
    StoredResource {
        id: envelope.id.clone(),
        version_id: envelope.meta.version_id.to_string(),
        resource_type: resource_type.to_string(),
        resource: envelope.as_json(),
        last_updated: envelope.meta.last_updated.clone().into_inner(),
        created_at: envelope.meta.last_updated.clone().into_inner(),
    }
}

fn history_entry(record: &HistoryRecord, resource_type: &str) -> HistoryEntry {
    let (resource, method) = match record {
        HistoryRecord::Live(envelope) => {
            let method = if envelope.meta.version_id == VersionId::FIRST {
                HistoryMethod::Create
            } else {
                HistoryMethod::Update
            };
            (to_stored(envelope, resource_type), method)
        }
        HistoryRecord::Deleted {
            id,
            version_id,
            last_updated,
            ..
        } => (
            StoredResource {
                id: id.clone(),
                version_id: version_id.to_string(),
                resource_type: resource_type.to_string(),
                resource: Value::Null,
                last_updated: last_updated.clone().into_inner(),
                created_at: last_updated.clone().into_inner(),
            },
            HistoryMethod::Delete,
        ),
    };
    HistoryEntry { resource, method }
}

#[async_trait]
impl FhirStorage for InMemoryStorage {
    async fn create(&self, resource: &Value) -> Result<StoredResource, StoreError> {
        let resource_type_str = extract_resource_type(resource)?;
        let resource_type = parse_resource_type(&resource_type_str)?;
        let id = extract_id(resource).unwrap_or_else(fhirbase_core::generate_id);

        let envelope = ResourceEnvelope::new(resource_type.clone(), id.clone(), resource.clone());

        self.insert(&resource_type, envelope.clone())
            .await
            .map_err(|_| StoreError::conflict(format!("{resource_type_str}/{id} already exists")))?;

        Ok(to_stored(&envelope, &resource_type_str))
    }

    async fn read(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StoreError> {
        let rt = parse_resource_type(resource_type)?;
        Ok(self.get(&rt, id).await.map(|e| to_stored(&e, resource_type)))
    }

    async fn update(
        &self,
        resource: &Value,
        if_match: Option<&str>,
    ) -> Result<StoredResource, StoreError> {
        let resource_type_str = extract_resource_type(resource)?;
        let resource_type = parse_resource_type(&resource_type_str)?;
        let id = extract_id(resource)
            .ok_or_else(|| StoreError::malformed_input("missing id field for update"))?;

        let current = self
            .get(&resource_type, &id)
            .await
            .ok_or_else(|| StoreError::not_found(&resource_type_str, &id))?;

        if let Some(expected) = if_match {
            let actual = current.etag();
            if actual != expected {
                return Err(StoreError::precondition_failed(expected, actual));
            }
        }

        let next_version = current.meta.version_id.next();
        let mut meta = current.meta;
        meta.version_id = next_version;
        meta.last_updated = fhirbase_core::now_utc();

        let envelope = ResourceEnvelope::new(resource_type.clone(), id.clone(), resource.clone())
            .with_meta(meta);

        self.append(&resource_type, &id, HistoryRecord::Live(envelope.clone()))
            .await;

        Ok(to_stored(&envelope, &resource_type_str))
    }

    async fn delete(&self, resource_type: &str, id: &str) -> Result<(), StoreError> {
        let rt = parse_resource_type(resource_type)?;

        let current = self
            .get(&rt, id)
            .await
            .ok_or_else(|| StoreError::not_found(resource_type, id))?;

        let version_id = current.meta.version_id.next();
        let last_updated = fhirbase_core::now_utc();

        self.append(
            &rt,
            id,
            HistoryRecord::Deleted {
                resource_type: rt.clone(),
                id: id.to_string(),
                version_id,
                last_updated,
            },
        )
        .await;

        Ok(())
    }

    async fn vread(
        &self,
        resource_type: &str,
        id: &str,
        version: &str,
    ) -> Result<Option<StoredResource>, StoreError> {
        let history = self.history_for(resource_type, id).await;
        for record in history {
            if record.version_id().to_string() == version {
                return Ok(match record {
                    HistoryRecord::Live(envelope) => Some(to_stored(&envelope, resource_type)),
                    HistoryRecord::Deleted { .. } => None,
                });
            }
        }
        Ok(None)
    }

    async fn history(
        &self,
        resource_type: &str,
        id: Option<&str>,
        params: &HistoryParams,
    ) -> Result<HistoryResult, StoreError> {
        let records = match id {
            Some(id) => self.history_for(resource_type, id).await,
            None => self.type_history(resource_type).await,
        };

        let mut entries: Vec<HistoryEntry> = records
            .iter()
            .map(|r| history_entry(r, resource_type))
            .collect();

        entries.sort_by(|a, b| b.resource.last_updated.cmp(&a.resource.last_updated));

        if let Some(since) = params.since {
            entries.retain(|e| e.resource.last_updated >= since);
        }
        if let Some(at) = params.at {
            entries.retain(|e| e.resource.last_updated <= at);
        }

        let total = entries.len() as u32;
        let offset = params.offset.unwrap_or(0) as usize;
        let count = params.count.unwrap_or(100) as usize;
        let entries: Vec<HistoryEntry> = entries.into_iter().skip(offset).take(count).collect();

        Ok(HistoryResult {
            entries,
            total: Some(total),
        })
    }

    async fn search(
        &self,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<SearchResult, StoreError> {
        parse_resource_type(resource_type)?;

        let all = self.all_live(resource_type).await;
        let total = all.len();
        let offset = params.offset.unwrap_or(0) as usize;
        let count = params.count.unwrap_or(10) as usize;

        let entries: Vec<StoredResource> = all
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|e| to_stored(&e, resource_type))
            .collect();

        Ok(SearchResult {
            has_more: offset + entries.len() < total,
            entries,
            total: Some(total as u32),
        })
    }

    async fn begin_transaction(&self) -> Result<Box<dyn FhirTransaction>, StoreError> {
        Ok(Box::new(InMemoryFhirTransaction::new()))
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "in-memory-papaya"
    }
}

/// A transaction that buffers operations and applies them to the backing
/// store on commit. Rollback simply discards the buffer: nothing is applied
/// to the store until `commit` runs.
pub struct InMemoryFhirTransaction {
    operations: Vec<TransactionOp>,
}

enum TransactionOp {
    Create(Value),
    Update(Value),
    Delete { resource_type: String, id: String },
}

impl InMemoryFhirTransaction {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }
}

#[async_trait]
impl FhirTransaction for InMemoryFhirTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create(&mut self, resource: &Value) -> Result<StoredResource, StoreError> {
        let resource_type = extract_resource_type(resource)?;
        let id = extract_id(resource).unwrap_or_else(fhirbase_core::generate_id);
        self.operations.push(TransactionOp::Create(resource.clone()));

        Ok(StoredResource {
            id,
            version_id: VersionId::FIRST.to_string(),
            resource_type,
            resource: resource.clone(),
            last_updated: fhirbase_core::now_utc().into_inner(),
            created_at: fhirbase_core::now_utc().into_inner(),
        })
    }

    async fn update(&mut self, resource: &Value) -> Result<StoredResource, StoreError> {
        let resource_type = extract_resource_type(resource)?;
        let id = extract_id(resource)
            .ok_or_else(|| StoreError::malformed_input("missing id field"))?;
        self.operations.push(TransactionOp::Update(resource.clone()));

        Ok(StoredResource {
            id,
            version_id: VersionId::FIRST.to_string(),
            resource_type,
            resource: resource.clone(),
            last_updated: fhirbase_core::now_utc().into_inner(),
            created_at: fhirbase_core::now_utc().into_inner(),
        })
    }

    async fn delete(&mut self, resource_type: &str, id: &str) -> Result<(), StoreError> {
        self.operations.push(TransactionOp::Delete {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    async fn read(
        &self,
        _resource_type: &str,
        _id: &str,
    ) -> Result<Option<StoredResource>, StoreError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_fhir_storage(storage: &InMemoryStorage) -> &dyn FhirStorage {
        storage
    }

    #[tokio::test]
    async fn create_then_read() {
        let storage = InMemoryStorage::new();
        let fhir = as_fhir_storage(&storage);

        let patient = serde_json::json!({
            "resourceType": "Patient",
            "name": [{"family": "Smith", "given": ["John"]}]
        });

        let created = fhir.create(&patient).await.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.resource_type, "Patient");
        assert_eq!(created.version_id, "1");

        let read = fhir.read("Patient", &created.id).await.unwrap().unwrap();
        assert_eq!(read.id, created.id);
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let storage = InMemoryStorage::new();
        let fhir = as_fhir_storage(&storage);

        let patient = serde_json::json!({"resourceType": "Patient", "name": [{"family": "Smith"}]});
        let created = fhir.create(&patient).await.unwrap();

        let updated_patient = serde_json::json!({
            "resourceType": "Patient",
            "id": created.id,
            "name": [{"family": "Jones"}]
        });
        let updated = fhir.update(&updated_patient, None).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.version_id, "2");
    }

    #[tokio::test]
    async fn delete_hides_resource_but_keeps_history() {
        let storage = InMemoryStorage::new();
        let fhir = as_fhir_storage(&storage);

        let patient = serde_json::json!({"resourceType": "Patient", "name": [{"family": "Smith"}]});
        let created = fhir.create(&patient).await.unwrap();

        fhir.delete("Patient", &created.id).await.unwrap();

        assert!(fhir.read("Patient", &created.id).await.unwrap().is_none());

        let history = fhir
            .history("Patient", Some(&created.id), &HistoryParams::new())
            .await
            .unwrap();
        assert_eq!(history.entries.len(), 2);
    }

    #[tokio::test]
    async fn precondition_failed_on_stale_etag() {
        let storage = InMemoryStorage::new();
        let fhir = as_fhir_storage(&storage);

        let patient = serde_json::json!({"resourceType": "Patient", "name": [{"family": "Smith"}]});
        let created = fhir.create(&patient).await.unwrap();

        let updated = serde_json::json!({
            "resourceType": "Patient",
            "id": created.id,
            "name": [{"family": "Jones"}]
        });
        let result = fhir.update(&updated, Some("W/\"99\"")).await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed { .. })));
    }

    #[tokio::test]
    async fn create_conflict_on_duplicate_id() {
        let storage = InMemoryStorage::new();
        let fhir = as_fhir_storage(&storage);

        let patient = serde_json::json!({
            "resourceType": "Patient",
            "id": "fixed-id",
            "name": [{"family": "Smith"}]
        });
        fhir.create(&patient).await.unwrap();

        let result = fhir.create(&patient).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn search_paginates_results() {
        let storage = InMemoryStorage::new();
        let fhir = as_fhir_storage(&storage);

        for i in 0..5 {
            let patient = serde_json::json!({
                "resourceType": "Patient",
                "name": [{"family": format!("Patient{i}")}]
            });
            fhir.create(&patient).await.unwrap();
        }

        let params = SearchParams::new().with_count(3);
        let result = fhir.search("Patient", &params).await.unwrap();

        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.total, Some(5));
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn backend_metadata() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.backend_name(), "in-memory-papaya");
        assert!(storage.supports_transactions());
    }
}
