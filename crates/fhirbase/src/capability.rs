//! `CapabilityStatement` assembly for `GetMetadata` / `SystemCapabilities`.
//!
//! SPEC §3's invariant: `rest[0].resource[i].searchParam` length equals the
//! number of active, non-ignored registered parameters for that resource
//! type plus the tenant's common parameters — exactly what
//! [`SearchParameterRegistry::count_for_type`] and
//! [`SearchParameterRegistry::get_all_for_type`] already compute.

use fhirbase_config::TenantConfig;
use fhirbase_search::SearchParameterRegistry;
use serde_json::{Value, json};

pub fn build_capability_statement(config: &TenantConfig, registry: &SearchParameterRegistry) -> Value {
    let mut resource_types: Vec<&String> = config.enabled_resource_types.iter().collect();
    resource_types.sort();

    let resources: Vec<Value> = resource_types
        .iter()
        .map(|resource_type| {
            let search_params: Vec<Value> = registry
                .get_all_for_type(resource_type)
                .iter()
                .map(|param| {
                    json!({
                        "name": param.code,
                        "type": format!("{:?}", param.kind).to_lowercase(),
                        "documentation": param.description,
                    })
                })
                .collect();

            json!({
                "type": resource_type,
                "interaction": [
                    {"code": "read"},
                    {"code": "vread"},
                    {"code": "update"},
                    {"code": "delete"},
                    {"code": "history-instance"},
                    {"code": "create"},
                    {"code": "search-type"},
                ],
                "searchParam": search_params,
            })
        })
        .collect();

    json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "date": fhirbase_core::now_utc().to_string(),
        "kind": "instance",
        "fhirVersion": config.fhir_version.to_string(),
        "format": ["application/fhir+json"],
        "rest": [{
            "mode": "server",
            "resource": resources,
        }],
    })
}
