//! End-to-end scenarios exercising a tenant store through its public
//! interaction methods rather than any single module in isolation.

use fhirbase_config::TenantConfig;
use fhirbase_search::{SearchParameter, SearchParameterType};
use fhirbase::tenant::TenantStore;
use serde_json::json;

fn config(enabled: &[&str]) -> TenantConfig {
    let types = enabled
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");
    TenantConfig::from_toml(&format!(
        r#"
route = "default"
base_url = "http://localhost/fhir"
fhir_version = "4.3.0"
enabled_resource_types = [{types}]
"#
    ))
    .unwrap()
}

fn patient_search_parameters() -> Vec<serde_json::Value> {
    vec![
        json!({
            "resourceType": "SearchParameter",
            "url": "urn:test:patient-name",
            "code": "name",
            "type": "string",
            "base": ["Patient"],
            "expression": "Patient.name",
        }),
        json!({
            "resourceType": "SearchParameter",
            "url": "urn:test:patient-gender",
            "code": "gender",
            "type": "token",
            "base": ["Patient"],
            "expression": "Patient.gender",
        }),
        json!({
            "resourceType": "SearchParameter",
            "url": "urn:test:patient-birthdate",
            "code": "birthdate",
            "type": "date",
            "base": ["Patient"],
            "expression": "Patient.birthDate",
        }),
    ]
}

fn observation_value_quantity_parameter() -> serde_json::Value {
    json!({
        "resourceType": "SearchParameter",
        "url": "urn:test:observation-value-quantity",
        "code": "value-quantity",
        "type": "quantity",
        "base": ["Observation"],
        "expression": "Observation.valueQuantity",
    })
}

/// 1. Create + read Patient (R4B) round trips with the assigned id, version
/// one, and a matching ETag.
#[tokio::test]
async fn create_then_read_patient_round_trips() {
    let store = TenantStore::new(config(&["Patient"]));

    let body = json!({
        "resourceType": "Patient",
        "id": "example",
        "name": [{"family": "Chalmers", "given": ["Peter", "James"]}],
    });
    let created = store.instance_create("Patient", body, None, true).await.unwrap();
    assert_eq!(created.status, 201);
    assert_eq!(created.etag.as_deref(), Some("W/\"1\""));
    assert_eq!(created.location.as_deref(), Some("Patient/example"));

    let read = store.instance_read("Patient", "example", None).await.unwrap();
    assert_eq!(read.status, 200);
    assert_eq!(read.etag.as_deref(), Some("W/\"1\""));
    let resource = read.resource.unwrap();
    assert_eq!(resource["name"][0]["family"], "Chalmers");
}

/// 2. Capability resource count equals the tenant's enabled-type count, and
/// registering a `SearchParameter` for `Patient` only bumps `Patient`'s count.
#[tokio::test]
async fn capability_statement_reflects_enabled_types_and_new_search_parameter() {
    let store = TenantStore::new(config(&["Patient", "Observation", "Encounter"]));

    let metadata = store.get_metadata();
    let resources = metadata.resource.unwrap()["rest"][0]["resource"].as_array().unwrap().clone();
    assert_eq!(resources.len(), 3);

    let patient_before = resources
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

    let after = store.get_metadata().resource.unwrap();
    let after_resources = after["rest"][0]["resource"].as_array().unwrap();
    let patient_after = after_resources.iter().find(|r| r["type"] == "Patient").unwrap()["searchParam"]
        .as_array()
        .unwrap()
        .len();
    let observation_after = after_resources.iter().find(|r| r["type"] == "Observation").unwrap()["searchParam"]
        .as_array()
        .unwrap()
        .len();

    assert_eq!(patient_after, patient_before + 1);
    assert_eq!(observation_after, patient_before);
}

async fn observation(store: &TenantStore, id: &str, quantity: serde_json::Value) {
    store
        .instance_create(
            "Observation",
            json!({"resourceType": "Observation", "id": id, "status": "final", "valueQuantity": quantity}),
            None,
            true,
        )
        .await
        .unwrap();
}

async fn search_total(store: &TenantStore, resource_type: &str, query: &str) -> usize {
    let outcome = store.type_search(resource_type, query).await.unwrap();
    outcome.resource.unwrap()["total"].as_u64().unwrap() as usize
}

/// 3. Observation value-quantity search across unit/system/code combinations.
#[tokio::test]
async fn observation_value_quantity_search() {
    let store = TenantStore::with_search_parameters(
        config(&["Observation"]),
        &[observation_value_quantity_parameter()],
    );

    observation(&store, "weight", json!({"value": 185, "unit": "[lb_av]", "system": "http://unitsofmeasure.org", "code": "[lb_av]"})).await;
    observation(&store, "flow", json!({"value": 820, "unit": "cL/s"})).await;
    observation(&store, "mass", json!({"value": 84.1, "unit": "kg", "system": "http://unitsofmeasure.org", "code": "kg"})).await;

    assert_eq!(search_total(&store, "Observation", "value-quantity=185|http://unitsofmeasure.org|[lb_av]").await, 1);
    assert_eq!(search_total(&store, "Observation", "value-quantity=ge185").await, 2);
    assert_eq!(search_total(&store, "Observation", "value-quantity=gt185|http://unitsofmeasure.org|[lb_av]").await, 0);
    assert_eq!(search_total(&store, "Observation", "value-quantity=820||cL/s").await, 1);
}

async fn patient(store: &TenantStore, id: &str, family: &str, given: &[&str], gender: &str) {
    store
        .instance_create(
            "Patient",
            json!({
                "resourceType": "Patient",
                "id": id,
                "name": [{"family": family, "given": given}],
                "gender": gender,
            }),
            None,
            true,
        )
        .await
        .unwrap();
}

/// 4. Patient text search across `_id`, `name`, and `gender`.
#[tokio::test]
async fn patient_text_search() {
    let store = TenantStore::with_search_parameters(config(&["Patient"]), &patient_search_parameters());

    patient(&store, "example", "Chalmers", &["Peter", "James"], "male").await;
    patient(&store, "p2", "Smith", &["John"], "male").await;
    patient(&store, "p3", "Jones", &["Susan"], "female").await;
    patient(&store, "p4", "Williams", &["Anne"], "female").await;
    patient(&store, "p5", "Brown", &["Sam"], "other").await;

    assert_eq!(search_total(&store, "Patient", "_id=example").await, 1);
    assert_eq!(search_total(&store, "Patient", "_id:not=example").await, 4);
    assert_eq!(search_total(&store, "Patient", "name=peter").await, 1);
    assert_eq!(search_total(&store, "Patient", "name=not-present,peter").await, 1);
    assert_eq!(search_total(&store, "Patient", "name:contains=eter").await, 1);
    assert_eq!(search_total(&store, "Patient", "name:exact=peter").await, 0);
    assert_eq!(search_total(&store, "Patient", "_profile:missing=true").await, 5);
    assert_eq!(search_total(&store, "Patient", "gender=male,female").await, 4);
}

/// 5. Date-precision search: a year or month query widens to match any day inside it.
#[tokio::test]
async fn date_precision_search() {
    let store = TenantStore::with_search_parameters(config(&["Patient"]), &patient_search_parameters());

    store
        .instance_create(
            "Patient",
            json!({"resourceType": "Patient", "id": "jan", "birthDate": "1982-01-23"}),
            None,
            true,
        )
        .await
        .unwrap();
    store
        .instance_create(
            "Patient",
            json!({"resourceType": "Patient", "id": "jun", "birthDate": "1982-06-10"}),
            None,
            true,
        )
        .await
        .unwrap();

    assert_eq!(search_total(&store, "Patient", "birthdate=1982-01-23").await, 1);
    assert_eq!(search_total(&store, "Patient", "birthdate=1982-01").await, 1);
    assert_eq!(search_total(&store, "Patient", "birthdate=1982").await, 2);
}

/// 6. A Subscription fires exactly once, when an Encounter transitions to
/// `finished`, not on the earlier `in-progress` update.
#[tokio::test]
async fn subscription_fires_once_on_status_transition_to_finished() {
    let store = TenantStore::new(config(&["Patient", "Encounter", "SubscriptionTopic", "Subscription"]));

    // `status` needs to be registered for the topic's queryCriteria to evaluate.
    store
        .instance_create(
            "SearchParameter",
            json!({
                "resourceType": "SearchParameter",
                "url": "urn:test:encounter-status",
                "code": "status",
                "type": "token",
                "base": ["Encounter"],
                "expression": "Encounter.status",
            }),
            None,
            false,
        )
        .await
        .unwrap();

    store
        .instance_create(
            "SubscriptionTopic",
            json!({
                "resourceType": "SubscriptionTopic",
                "id": "encounter-finished",
                "url": "urn:test:topic:encounter-finished",
                "resourceTrigger": [{
                    "resource": "Encounter",
                    "supportedInteraction": ["update"],
                    "queryCriteria": {"current": "status=finished"},
                }],
                "notificationShape": [{"resource": "Encounter", "include": []}],
            }),
            None,
            true,
        )
        .await
        .unwrap();

    store
        .instance_create(
            "Subscription",
            json!({
                "resourceType": "Subscription",
                "id": "sub1",
                "status": "active",
                "topic": "urn:test:topic:encounter-finished",
                "channelType": {"code": "rest-hook"},
                "endpoint": "https://example.org/hook",
                "content": "full-resource",
            }),
            None,
            true,
        )
        .await
        .unwrap();

    store
        .instance_create("Patient", json!({"resourceType": "Patient", "id": "pat1"}), None, true)
        .await
        .unwrap();
    store
        .instance_create(
            "Encounter",
            json!({"resourceType": "Encounter", "id": "enc1", "status": "in-progress"}),
            None,
            true,
        )
        .await
        .unwrap();

    let after_create = store.subscription_status("sub1").await.unwrap();
    assert_eq!(after_create.current_event_count, 0);

    store
        .instance_update(
            "Encounter",
            "enc1",
            json!({"resourceType": "Encounter", "id": "enc1", "status": "in-progress", "class": {"code": "AMB"}}),
            None,
            true,
        )
        .await
        .unwrap();
    let still_zero = store.subscription_status("sub1").await.unwrap();
    assert_eq!(still_zero.current_event_count, 0);

    store
        .instance_update(
            "Encounter",
            "enc1",
            json!({"resourceType": "Encounter", "id": "enc1", "status": "finished"}),
            None,
            true,
        )
        .await
        .unwrap();

    let fired = store.subscription_status("sub1").await.unwrap();
    assert_eq!(fired.current_event_count, 1);
    assert!(fired.generated_events.contains_key(&1));
}
