//! Lock-free, in-process resource store.
//!
//! Resources live in a [`papaya::HashMap`] keyed by `"ResourceType/id"`. Each
//! entry holds the full version history for that id, guarded by a
//! [`tokio::sync::RwLock`] so a single writer excludes concurrent writers to
//! the same resource while readers elsewhere in the map proceed unimpeded.
//! This mirrors the single-writer/multi-reader discipline the store design
//! calls for, scoped to one key rather than the whole map.

use fhirbase_core::resource::VersionId;
use fhirbase_core::{FhirDateTime, ResourceEnvelope, ResourceType};
use papaya::HashMap as PapayaHashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One entry in a resource's version history.
#[derive(Debug, Clone)]
pub enum HistoryRecord {
    /// A create or update, holding the resource body at that version.
    Live(ResourceEnvelope),
    /// A delete, recording only the version/id/timestamp of the tombstone.
    Deleted {
        resource_type: ResourceType,
        id: String,
        version_id: VersionId,
        last_updated: FhirDateTime,
    },
}

impl HistoryRecord {
    pub fn version_id(&self) -> VersionId {
        match self {
            Self::Live(envelope) => envelope.meta.version_id,
            Self::Deleted { version_id, .. } => *version_id,
        }
    }

    pub fn last_updated(&self) -> FhirDateTime {
        match self {
            Self::Live(envelope) => envelope.meta.last_updated.clone(),
            Self::Deleted { last_updated, .. } => last_updated.clone(),
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        match self {
            Self::Live(envelope) => &envelope.resource_type,
            Self::Deleted { resource_type, .. } => resource_type,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Live(envelope) => &envelope.id,
            Self::Deleted { id, .. } => id,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

/// The storage key for a resource instance: `"ResourceType/id"`.
pub fn make_storage_key(resource_type: &ResourceType, id: &str) -> String {
    format!("{resource_type}/{id}")
}

/// Same as [`make_storage_key`] but accepting a raw resource type string.
pub fn make_storage_key_str(resource_type: &str, id: &str) -> String {
    format!("{resource_type}/{id}")
}

/// Lock-free, versioned, in-memory resource store for one tenant.
///
/// Implements [`fhirbase_storage::FhirStorage`] (see `fhir_impl.rs`); this
/// module owns only the data structure and the operations that mutate it
/// under the per-id lock.
pub struct InMemoryStorage {
    pub(crate) data: PapayaHashMap<String, Arc<RwLock<Vec<HistoryRecord>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            data: PapayaHashMap::new(),
        }
    }

    /// Returns the live envelope for `(resource_type, id)`, if any.
    pub async fn get(&self, resource_type: &ResourceType, id: &str) -> Option<ResourceEnvelope> {
        let key = make_storage_key(resource_type, id);
        let history = {
            let guard = self.data.pin();
            guard.get(&key)?.clone()
        };
        let history = history.read().await;
        match history.last() {
            Some(HistoryRecord::Live(envelope)) => Some(envelope.clone()),
            _ => None,
        }
    }

    /// Inserts the first version of a resource. Fails if the key already exists.
    pub async fn insert(
        &self,
        resource_type: &ResourceType,
        envelope: ResourceEnvelope,
    ) -> Result<(), ResourceEnvelope> {
        let key = make_storage_key(resource_type, &envelope.id);
        let guard = self.data.pin();

        if guard.get(&key).is_some() {
            return Err(envelope);
        }

        guard.insert(key, Arc::new(RwLock::new(vec![HistoryRecord::Live(envelope)])));
        Ok(())
    }

    /// Appends a new version on top of existing history (or creates the key
    /// if this is the first version). Returns the record that was appended.
    pub async fn append(&self, resource_type: &ResourceType, id: &str, record: HistoryRecord) {
        let key = make_storage_key(resource_type, id);
        let history = {
            let guard = self.data.pin();
            match guard.get(&key) {
                Some(history) => Some(history.clone()),
                None => {
                    guard.insert(key, Arc::new(RwLock::new(vec![record.clone()])));
                    None
                }
            }
        };

        if let Some(history) = history {
            history.write().await.push(record);
        }
    }

    /// The next version for `(resource_type, id)`, given its current history.
    pub async fn next_version(&self, resource_type: &ResourceType, id: &str) -> VersionId {
        let key = make_storage_key(resource_type, id);
        let history = {
            let guard = self.data.pin();
            guard.get(&key).cloned()
        };
        match history {
            Some(history) => match history.read().await.last() {
                Some(record) => record.version_id().next(),
                None => VersionId::FIRST,
            },
            None => VersionId::FIRST,
        }
    }

    /// Full version history for one resource, oldest first.
    pub async fn history_for(&self, resource_type: &str, id: &str) -> Vec<HistoryRecord> {
        let key = make_storage_key_str(resource_type, id);
        let history = {
            let guard = self.data.pin();
            guard.get(&key).cloned()
        };
        match history {
            Some(history) => history.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// History for every resource of `resource_type`, flattened, oldest
    /// version first within each resource.
    pub async fn type_history(&self, resource_type: &str) -> Vec<HistoryRecord> {
        let prefix = format!("{resource_type}/");
        let matching: Vec<_> = {
            let guard = self.data.pin();
            guard
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(_, history)| history.clone())
                .collect()
        };

        let mut out = Vec::new();
        for history in matching {
            out.extend(history.read().await.iter().cloned());
        }
        out
    }

    /// All live resources of `resource_type`.
    pub async fn all_live(&self, resource_type: &str) -> Vec<ResourceEnvelope> {
        let prefix = format!("{resource_type}/");
        let matching: Vec<_> = {
            let guard = self.data.pin();
            guard
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(_, history)| history.clone())
                .collect()
        };

        let mut out = Vec::new();
        for history in matching {
            if let Some(HistoryRecord::Live(envelope)) = history.read().await.last() {
                out.push(envelope.clone());
            }
        }
        out
    }

    /// Total number of resources (of any type) currently live.
    pub async fn count(&self) -> usize {
        let all: Vec<_> = {
            let guard = self.data.pin();
            guard.iter().map(|(_, history)| history.clone()).collect()
        };

        let mut total = 0;
        for history in all {
            if matches!(history.read().await.last(), Some(HistoryRecord::Live(_))) {
                total += 1;
            }
        }
        total
    }

    /// Number of live resources of a given type.
    pub async fn count_by_type(&self, resource_type: &ResourceType) -> usize {
        self.all_live(&resource_type.to_string()).await.len()
    }

    pub async fn exists(&self, resource_type: &ResourceType, id: &str) -> bool {
        self.get(resource_type, id).await.is_some()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a resource type string, used by the [`fhirbase_storage::FhirStorage`]
/// impl where the trait only hands us `&str`.
pub(crate) fn parse_resource_type(s: &str) -> Result<ResourceType, fhirbase_storage::StoreError> {
    ResourceType::from_str(s).map_err(|_| fhirbase_storage::StoreError::unsupported_type(s))
}
