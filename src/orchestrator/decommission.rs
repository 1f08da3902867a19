//! Decommission operation per jurisdiction type (§4.6). All paths set
//! `active=false` eagerly and rely on monitors for terminal cleanup.

use super::jobs::MonitorJob;
use super::state::{can_decommission, JurisdictionState};
use super::EngineContext;
use crate::errors::ProvisionerError;
use crate::store::models::{Jurisdiction, JurisdictionKind};

async fn kind_of(ctx: &EngineContext, jurisdiction: &Jurisdiction) -> Result<JurisdictionKind, ProvisionerError> {
    let jt = ctx.store.get_jurisdiction_type(jurisdiction.jurisdiction_type_id).await?;
    jt.kind().ok_or_else(|| ProvisionerError::PrecondFail(format!("jurisdiction type '{}' is not one of control_group/tier/cluster", jt.name)))
}

async fn require_active(jurisdiction: &Jurisdiction) -> Result<(), ProvisionerError> {
    if !can_decommission(JurisdictionState::from_active_flag(jurisdiction.active)) {
        return Err(ProvisionerError::PrecondFail(format!("jurisdiction {} is not active", jurisdiction.id)));
    }
    Ok(())
}

async fn require_no_active_children(ctx: &EngineContext, jurisdiction: &Jurisdiction) -> Result<(), ProvisionerError> {
    let children = ctx.store.children(jurisdiction.id).await?;
    if children.iter().any(|child| child.active) {
        return Err(ProvisionerError::Conflict(format!("jurisdiction {} has an active child", jurisdiction.id)));
    }
    Ok(())
}

pub async fn decommission(ctx: &EngineContext, jurisdiction_id: i64) -> Result<Jurisdiction, ProvisionerError> {
    let jurisdiction = ctx.store.get_jurisdiction(jurisdiction_id).await?;
    match kind_of(ctx, &jurisdiction).await? {
        JurisdictionKind::ControlGroup => decommission_control_group(ctx, jurisdiction).await,
        JurisdictionKind::Tier => decommission_tier(ctx, jurisdiction).await,
        JurisdictionKind::Cluster => decommission_cluster(ctx, jurisdiction).await,
    }
}

async fn decommission_control_group(ctx: &EngineContext, jurisdiction: Jurisdiction) -> Result<Jurisdiction, ProvisionerError> {
    require_active(&jurisdiction).await?;
    require_no_active_children(ctx, &jurisdiction).await?;

    let assets = jurisdiction.assets_or_empty();
    let bucket = assets.get("s3_bucket").and_then(serde_json::Value::as_str);
    let stack_id = assets.get("cloudformation_stack").and_then(|s| s.get("stack_id")).and_then(serde_json::Value::as_str);

    if let Some(bucket) = bucket {
        let objects = ctx.cloud.list_objects(bucket, "").await?;
        if !objects.is_empty() {
            ctx.cloud.delete_objects(bucket, &objects).await?;
        }
    }
    if let Some(stack_id) = stack_id {
        ctx.cloud.delete_stack(stack_id).await?;
    }

    ctx.store.set_active(jurisdiction.id, false).await?;
    ctx.queue
        .enqueue(MonitorJob::Stack { jurisdiction_id: jurisdiction.id, interim: true, key: Some("delete".to_string()) })
        .await?;

    Ok(ctx.store.get_jurisdiction(jurisdiction.id).await?)
}

async fn decommission_tier(ctx: &EngineContext, jurisdiction: Jurisdiction) -> Result<Jurisdiction, ProvisionerError> {
    require_active(&jurisdiction).await?;
    require_no_active_children(ctx, &jurisdiction).await?;

    let assets = jurisdiction.assets_or_empty();
    if let Some(stack_id) = assets.get("cloudformation_stack").and_then(|s| s.get("stack_id")).and_then(serde_json::Value::as_str) {
        ctx.cloud.delete_stack(stack_id).await?;
    }

    ctx.store.set_active(jurisdiction.id, false).await?;
    ctx.queue
        .enqueue(MonitorJob::Stack { jurisdiction_id: jurisdiction.id, interim: true, key: Some("delete".to_string()) })
        .await?;

    Ok(ctx.store.get_jurisdiction(jurisdiction.id).await?)
}

async fn decommission_cluster(ctx: &EngineContext, jurisdiction: Jurisdiction) -> Result<Jurisdiction, ProvisionerError> {
    require_active(&jurisdiction).await?;

    let assets = jurisdiction.assets_or_empty();
    let stack = assets.get("cloudformation_stack").cloned().unwrap_or_default();
    let nodes_stack_id = stack
        .get("nodes")
        .and_then(|n| n.get("stack_id"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ProvisionerError::PrecondFail(format!("jurisdiction {} has no nodes stack to decommission", jurisdiction.id)))?
        .to_string();
    let network_stack_id = stack
        .get("network")
        .and_then(|n| n.get("stack_id"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ProvisionerError::PrecondFail(format!("jurisdiction {} has no network stack to decommission", jurisdiction.id)))?
        .to_string();

    if let Some(key_pair) = assets.get("ec2_key_pair").and_then(serde_json::Value::as_str) {
        ctx.cloud.delete_key_pair(key_pair).await?;
    }
    if let Some(kms_key) = assets.get("kms_key").and_then(|k| k.get("alias")).and_then(serde_json::Value::as_str) {
        ctx.cloud.kms_delete_alias(kms_key).await?;
    }
    if let Some(key_id) = assets.get("kms_key").and_then(|k| k.get("id")).and_then(serde_json::Value::as_str) {
        ctx.cloud.kms_schedule_key_deletion(key_id).await?;
    }
    ctx.cloud.delete_stack(&nodes_stack_id).await?;

    ctx.store.set_active(jurisdiction.id, false).await?;
    ctx.queue
        .enqueue(MonitorJob::Decommission { jurisdiction_id: jurisdiction.id, nodes_stack_id, network_stack_id })
        .await?;

    Ok(ctx.store.get_jurisdiction(jurisdiction.id).await?)
}
