//! Orchestrator scenario tests, covering the testable properties and
//! scenarios 1/2/3/5 of §8 against the in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use super::jobs::InMemoryJobQueue;
use super::monitor::PollPolicy;
use super::{decommission, monitor, provision, EngineContext};
use crate::cloud::fake::FakeCloudAdapter;
use crate::store::fake::FakeStore;
use crate::store::models::{Jurisdiction, JurisdictionType};

fn immediate_policy() -> PollPolicy {
    PollPolicy { interval: Duration::from_millis(0), max_checks: 3 }
}

fn seed_types(store: &FakeStore) {
    store.seed_jurisdiction_type(JurisdictionType { id: 1, name: "control_group".to_string(), description: "control group".to_string(), parent_id: None });
    store.seed_jurisdiction_type(JurisdictionType { id: 2, name: "tier".to_string(), description: "tier".to_string(), parent_id: Some(1) });
    store.seed_jurisdiction_type(JurisdictionType { id: 3, name: "cluster".to_string(), description: "cluster".to_string(), parent_id: Some(2) });
}

fn jurisdiction(id: i64, type_id: i64, parent_id: Option<i64>, active: bool, configuration: serde_json::Value) -> Jurisdiction {
    Jurisdiction {
        id,
        name: format!("j{id}"),
        created_on: Utc::now(),
        active,
        configuration,
        assets: None,
        metadata: None,
        jurisdiction_type_id: type_id,
        parent_id,
    }
}

fn context(store: FakeStore, cloud: Arc<FakeCloudAdapter>) -> EngineContext {
    EngineContext { store: Arc::new(store), cloud, queue: Arc::new(InMemoryJobQueue::new()) }
}

#[tokio::test]
async fn control_group_create_and_provision_eventually_activates() {
    let store = FakeStore::new();
    seed_types(&store);
    store.seed_jurisdiction(jurisdiction(1, 1, None, false, json!({"platform": "aws", "region": "us-east-1"})));
    let cloud = Arc::new(FakeCloudAdapter::new());
    let ctx = context(store, cloud.clone());

    let provisioned = provision(&ctx, 1).await.unwrap();
    assert!(!provisioned.active);
    assert!(provisioned.assets.as_ref().unwrap().get("s3_bucket").is_some());

    let stack_id = provisioned.assets.unwrap()["cloudformation_stack"]["stack_id"].as_str().unwrap().to_string();
    cloud.set_stack_status(&stack_id, "CREATE_COMPLETE");

    monitor::monitor_stack(&ctx, 1, false, None, &immediate_policy()).await.unwrap();

    let final_jurisdiction = ctx.store.get_jurisdiction(1).await.unwrap();
    assert!(final_jurisdiction.active);
    assert_eq!(final_jurisdiction.assets.unwrap()["cloudformation_stack"]["status"], json!("CREATE_COMPLETE"));
}

#[tokio::test]
async fn tier_provision_requires_active_parent() {
    let store = FakeStore::new();
    seed_types(&store);
    store.seed_jurisdiction(jurisdiction(1, 1, None, false, json!({"platform": "aws", "region": "us-east-1"})));
    store.seed_jurisdiction(jurisdiction(2, 2, Some(1), false, json!({"primary_cluster_cidr": "10.0.0.0/16"})));
    let ctx = context(store, Arc::new(FakeCloudAdapter::new()));

    let err = provision(&ctx, 2).await.unwrap_err();
    assert!(err.to_string().to_lowercase().contains("inactive"));
}

#[tokio::test]
async fn active_child_blocks_parent_decommission() {
    let store = FakeStore::new();
    seed_types(&store);
    store.seed_jurisdiction(jurisdiction(1, 1, None, true, json!({"platform": "aws", "region": "us-east-1"})));
    store.seed_jurisdiction(jurisdiction(2, 2, Some(1), true, json!({"primary_cluster_cidr": "10.0.0.0/16"})));
    let ctx = context(store, Arc::new(FakeCloudAdapter::new()));

    let err = decommission(&ctx, 1).await.unwrap_err();
    assert!(matches!(err, crate::errors::ProvisionerError::Conflict(_)));
}

#[tokio::test]
async fn unsupported_platform_is_rejected() {
    let store = FakeStore::new();
    seed_types(&store);
    store.seed_jurisdiction(jurisdiction(1, 1, None, false, json!({"platform": "bare_metal", "region": "us-east-1"})));
    let ctx = context(store, Arc::new(FakeCloudAdapter::new()));

    let err = provision(&ctx, 1).await.unwrap_err();
    assert!(err.to_string().contains("bare_metal"));
}

#[tokio::test]
async fn dedicated_etcd_produces_an_etcd_security_group_in_the_network_stack() {
    let store = FakeStore::new();
    seed_types(&store);
    store.seed_jurisdiction(jurisdiction(1, 1, None, true, json!({"platform": "aws", "region": "us-east-1"})));
    store.seed_jurisdiction(jurisdiction(2, 2, Some(1), true, json!({"primary_cluster_cidr": "10.0.0.0/16"})));
    store.seed_jurisdiction(jurisdiction(
        3,
        3,
        Some(2),
        false,
        json!({
            "host_subnet_cidrs": ["10.0.1.0/24"],
            "dedicated_etcd": true,
            "controller_ips": ["10.0.1.10"],
            "etcd_ips": ["10.0.1.20"],
        }),
    ));
    let cloud = Arc::new(FakeCloudAdapter::new());
    let ctx = context(store, cloud.clone());

    provision(&ctx, 3).await.unwrap();

    let template = cloud.submitted_template("ClusterNet0003").expect("network stack was submitted");
    assert!(template["Resources"].as_object().unwrap().contains_key("EtcdElb"));
}
