//! The resource instance type held by per-type resource stores.
//!
//! A `ResourceEnvelope` pairs a FHIR resource body (serialized as JSON, the
//! natural input format for FHIRPath evaluation) with the version metadata the
//! store itself owns: `versionId` and `lastUpdated`. The body's own `meta`
//! block is kept in sync with this metadata on every read so a caller never
//! observes a resource whose `meta.versionId` disagrees with its ETag.

use crate::{FhirDateTime, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A resource version identifier.
///
/// Per the store's invariants this is always an ASCII integer starting at 1,
/// strictly increasing across successive updates of the same `(type, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub u64);

impl VersionId {
    pub const FIRST: VersionId = VersionId(1);

    pub fn next(self) -> VersionId {
        VersionId(self.0 + 1)
    }

    /// Render as the weak ETag the versioned store returns on every interaction.
    pub fn etag(self) -> String {
        format!("W/\"{self}\"")
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(VersionId)
    }
}

/// Version metadata the store attaches to every resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub version_id: VersionId,
    pub last_updated: FhirDateTime,
}

impl ResourceMeta {
    pub fn new(version_id: VersionId) -> Self {
        Self {
            version_id,
            last_updated: crate::time::now_utc(),
        }
    }

    pub fn bump(&mut self) {
        self.version_id = self.version_id.next();
        self.last_updated = crate::time::now_utc();
    }
}

/// A stored FHIR resource instance: addressable by `(resource_type, id)`,
/// carrying the JSON body plus the store-owned version metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEnvelope {
    pub resource_type: ResourceType,
    pub id: String,
    pub meta: ResourceMeta,
    /// The complete resource body, as supplied by the caller at create/update
    /// time. `resourceType`, `id`, and `meta.versionId`/`meta.lastUpdated` are
    /// re-stamped onto this value by [`ResourceEnvelope::as_json`] so callers
    /// always observe metadata consistent with `meta`.
    body: Value,
}

impl ResourceEnvelope {
    pub fn new(resource_type: ResourceType, id: impl Into<String>, body: Value) -> Self {
        Self {
            resource_type,
            id: id.into(),
            meta: ResourceMeta::new(VersionId::FIRST),
            body,
        }
    }

    pub fn with_meta(mut self, meta: ResourceMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Replace the body (used by `InstanceUpdate`); does not touch `meta` —
    /// callers bump the version separately so create/update share one path.
    pub fn set_body(&mut self, body: Value) {
        self.body = body;
    }

    pub fn raw_body(&self) -> &Value {
        &self.body
    }

    /// The resource as it should be handed back to a caller: `id`,
    /// `resourceType`, and `meta.versionId`/`meta.lastUpdated` stamped in.
    pub fn as_json(&self) -> Value {
        let mut out = self.body.clone();
        if let Some(obj) = out.as_object_mut() {
            obj.insert(
                "resourceType".to_string(),
                Value::String(self.resource_type.to_string()),
            );
            obj.insert("id".to_string(), Value::String(self.id.clone()));
            let mut meta = obj
                .get("meta")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            if let Some(meta_obj) = meta.as_object_mut() {
                meta_obj.insert(
                    "versionId".to_string(),
                    Value::String(self.meta.version_id.to_string()),
                );
                meta_obj.insert(
                    "lastUpdated".to_string(),
                    Value::String(self.meta.last_updated.to_string()),
                );
            }
            obj.insert("meta".to_string(), meta);
        }
        out
    }

    pub fn etag(&self) -> String {
        self.meta.version_id.etag()
    }

    pub fn location(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_id_display_and_etag() {
        assert_eq!(VersionId::FIRST.to_string(), "1");
        assert_eq!(VersionId::FIRST.etag(), "W/\"1\"");
        assert_eq!(VersionId::FIRST.next(), VersionId(2));
    }

    #[test]
    fn version_id_parses_ascii_integers() {
        assert_eq!("42".parse::<VersionId>().unwrap(), VersionId(42));
        assert!("abc".parse::<VersionId>().is_err());
    }

    #[test]
    fn new_envelope_starts_at_version_one() {
        let env = ResourceEnvelope::new(ResourceType::Patient, "p1", json!({"name": []}));
        assert_eq!(env.meta.version_id, VersionId::FIRST);
        assert_eq!(env.location(), "Patient/p1");
        assert_eq!(env.etag(), "W/\"1\"");
    }

    #[test]
    fn as_json_stamps_identity_and_meta() {
        let env = ResourceEnvelope::new(ResourceType::Patient, "p1", json!({"active": true}));
        let out = env.as_json();
        assert_eq!(out["resourceType"], "Patient");
        assert_eq!(out["id"], "p1");
        assert_eq!(out["meta"]["versionId"], "1");
        assert_eq!(out["active"], true);
    }

    #[test]
    fn bump_increments_version_and_timestamp() {
        let mut meta = ResourceMeta::new(VersionId::FIRST);
        let before = meta.last_updated.clone();
        std::thread::sleep(std::time::Duration::from_millis(2));
        meta.bump();
        assert_eq!(meta.version_id, VersionId(2));
        assert!(meta.last_updated > before);
    }

    #[test]
    fn set_body_preserves_meta() {
        let mut env = ResourceEnvelope::new(ResourceType::Patient, "p1", json!({"active": true}));
        env.meta.bump();
        env.set_body(json!({"active": false}));
        assert_eq!(env.meta.version_id, VersionId(2));
        assert_eq!(env.as_json()["active"], false);
    }
}
