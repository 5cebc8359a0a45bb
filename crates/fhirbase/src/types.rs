//! Response shapes every interaction in [`crate::tenant::TenantStore`] returns.

use serde_json::Value;

/// The outcome of a single FHIR interaction: enough for a transport layer to
/// build an HTTP response without re-deriving anything from the store.
#[derive(Debug, Clone)]
pub struct InteractionOutcome {
    pub status: u16,
    pub resource: Option<Value>,
    pub operation_outcome: Option<Value>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub location: Option<String>,
}

impl InteractionOutcome {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            resource: None,
            operation_outcome: None,
            etag: None,
            last_modified: None,
            location: None,
        }
    }

    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_outcome(mut self, outcome: Value) -> Self {
        self.operation_outcome = Some(outcome);
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.last_modified = Some(last_modified.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Builds a minimal `OperationOutcome` resource for a given issue severity,
/// code, and diagnostics string. Used both for error responses and for the
/// success outcome `$validate` returns.
pub fn operation_outcome(severity: &str, code: &str, diagnostics: &str) -> Value {
    serde_json::json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "severity": severity,
            "code": code,
            "diagnostics": diagnostics,
        }]
    })
}
