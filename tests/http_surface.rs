//! Integration tests for the `/v1/` HTTP surface (§6), exercised directly
//! against handler functions with the in-memory fakes — the same
//! fake-driven style the orchestrator unit tests use, lifted one layer up
//! to also cover request validation and the `{"data": ...}` envelope.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde_json::json;

use provisioner::cloud::fake::FakeCloudAdapter;
use provisioner::http::dto::{CreateJurisdictionRequest, EditJurisdictionRequest, IdQuery, JurisdictionIdRequest};
use provisioner::http::{handlers, AppState};
use provisioner::orchestrator::jobs::InMemoryJobQueue;
use provisioner::orchestrator::EngineContext;
use provisioner::store::fake::FakeStore;
use provisioner::store::models::{ConfigurationTemplate, JurisdictionType};
use provisioner::store::Store;

fn app_state() -> (AppState, Arc<FakeStore>) {
    let store = Arc::new(FakeStore::new());
    store.seed_jurisdiction_type(JurisdictionType {
        id: 1,
        name: "control_group".to_string(),
        description: "control group".to_string(),
        parent_id: None,
    });
    store.seed_configuration_template(ConfigurationTemplate {
        id: 1,
        name: "default_control_group".to_string(),
        configuration: json!({"platform": "aws", "region": "us-east-1"}),
        default: true,
        jurisdiction_type_id: 1,
    });

    let engine = EngineContext {
        store: store.clone(),
        cloud: Arc::new(FakeCloudAdapter::new()),
        queue: Arc::new(InMemoryJobQueue::new()),
    };
    (AppState { store: store.clone(), engine }, store)
}

#[tokio::test]
async fn create_jurisdiction_copies_configuration_from_its_template() {
    let (state, _fake_store) = app_state();

    let response = handlers::create_jurisdiction(
        State(state),
        Json(CreateJurisdictionRequest { name: "alpha".to_string(), type_id: 1, template_id: 1, parent_id: None }),
    )
    .await
    .unwrap();

    assert_eq!(response.0.data["name"], json!("alpha"));
    assert_eq!(response.0.data["configuration"]["platform"], json!("aws"));
    assert_eq!(response.0.data["active"], json!(false));
}

#[tokio::test]
async fn create_jurisdiction_rejects_duplicate_names() {
    let (state, _fake_store) = app_state();
    handlers::create_jurisdiction(
        State(state.clone()),
        Json(CreateJurisdictionRequest { name: "alpha".to_string(), type_id: 1, template_id: 1, parent_id: None }),
    )
    .await
    .unwrap();

    let duplicate = handlers::create_jurisdiction(
        State(state),
        Json(CreateJurisdictionRequest { name: "alpha".to_string(), type_id: 1, template_id: 1, parent_id: None }),
    )
    .await;

    assert!(duplicate.is_err());
}

#[tokio::test]
async fn create_jurisdiction_rejects_a_mismatched_template() {
    let (state, fake_store) = app_state();
    fake_store.seed_configuration_template(ConfigurationTemplate {
        id: 2,
        name: "wrong_type".to_string(),
        configuration: json!({}),
        default: false,
        jurisdiction_type_id: 99,
    });

    let result = handlers::create_jurisdiction(
        State(state),
        Json(CreateJurisdictionRequest { name: "beta".to_string(), type_id: 1, template_id: 2, parent_id: None }),
    )
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn edit_jurisdiction_refuses_once_active() {
    let (state, fake_store) = app_state();
    let created = handlers::create_jurisdiction(
        State(state.clone()),
        Json(CreateJurisdictionRequest { name: "alpha".to_string(), type_id: 1, template_id: 1, parent_id: None }),
    )
    .await
    .unwrap();
    let id = created.0.data["id"].as_i64().unwrap();

    handlers::provision_jurisdiction(State(state.clone()), Json(JurisdictionIdRequest { id })).await.unwrap();
    fake_store.set_active(id, true).await.unwrap();

    let result = handlers::edit_jurisdiction(
        State(state),
        Json(EditJurisdictionRequest { id, name: Some("renamed".to_string()), metadata: None, configuration: None }),
    )
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn get_jurisdiction_types_filters_by_id_query() {
    let (state, _fake_store) = app_state();

    let all = handlers::get_jurisdiction_types(State(state.clone()), Query(IdQuery { id: None })).await.unwrap();
    assert_eq!(all.0.data.as_array().unwrap().len(), 1);

    let one = handlers::get_jurisdiction_types(State(state), Query(IdQuery { id: Some(1) })).await.unwrap();
    assert_eq!(one.0.data.as_array().unwrap().len(), 1);
}
