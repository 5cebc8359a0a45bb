//! [`ReferenceResolver`] backed by a tenant's own in-memory storage.
//!
//! Used both by chained search parameters (`subject.name=...`) and by
//! notification bundle assembly, which dereferences `notificationShape`
//! includes against the same store the triggering event came from.

use std::future::Future;
use std::pin::Pin;

use fhirbase_core::ResourceType;
use fhirbase_memory::InMemoryStorage;
use fhirbase_search::ReferenceResolver;
use serde_json::Value;

pub struct StorageResolver<'a> {
    storage: &'a InMemoryStorage,
}

impl<'a> StorageResolver<'a> {
    pub fn new(storage: &'a InMemoryStorage) -> Self {
        Self { storage }
    }
}

impl<'a> ReferenceResolver for StorageResolver<'a> {
    fn resolve<'b>(
        &'b self,
        resource_type: &'b str,
        id: &'b str,
    ) -> Pin<Box<dyn Future<Output = Option<Value>> + Send + 'b>> {
        Box::pin(async move {
            let rt: ResourceType = resource_type.parse().ok()?;
            self.storage.get(&rt, id).await.map(|envelope| envelope.as_json())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirbase_core::ResourceEnvelope;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_a_stored_resource() {
        let storage = InMemoryStorage::new();
        storage
            .insert(
                &ResourceType::Patient,
                ResourceEnvelope::new(ResourceType::Patient, "p1", json!({"active": true})),
            )
            .await
            .unwrap();

        let resolver = StorageResolver::new(&storage);
        let resolved = resolver.resolve("Patient", "p1").await.unwrap();
        assert_eq!(resolved["id"], "p1");
    }

    #[tokio::test]
    async fn unknown_reference_resolves_to_none() {
        let storage = InMemoryStorage::new();
        let resolver = StorageResolver::new(&storage);
        assert!(resolver.resolve("Patient", "missing").await.is_none());
    }

    #[tokio::test]
    async fn unparseable_resource_type_resolves_to_none() {
        let storage = InMemoryStorage::new();
        let resolver = StorageResolver::new(&storage);
        assert!(resolver.resolve("not a type", "x").await.is_none());
    }
}
