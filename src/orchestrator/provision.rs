//! Synchronous provision prologue per jurisdiction type (§4.6).

use serde_json::json;

use super::json_ext::{bool_or, require_str};
use super::jobs::MonitorJob;
use super::state::{can_provision, JurisdictionState};
use super::EngineContext;
use crate::cloud_template::{cluster_network, control_group, tier};
use crate::cloud_template::builder::{cluster_network_stack_name, control_group_stack_name, tier_stack_name, vpc_export_name, route_table_export_name};
use crate::config_resolver::{effective_configuration, region};
use crate::errors::ProvisionerError;
use crate::store::models::{Jurisdiction, JurisdictionKind};

async fn kind_of(ctx: &EngineContext, jurisdiction: &Jurisdiction) -> Result<JurisdictionKind, ProvisionerError> {
    let jt = ctx.store.get_jurisdiction_type(jurisdiction.jurisdiction_type_id).await?;
    jt.kind().ok_or_else(|| ProvisionerError::PrecondFail(format!("jurisdiction type '{}' is not one of control_group/tier/cluster", jt.name)))
}

pub async fn provision(ctx: &EngineContext, jurisdiction_id: i64) -> Result<Jurisdiction, ProvisionerError> {
    let jurisdiction = ctx.store.get_jurisdiction(jurisdiction_id).await?;
    if !can_provision(JurisdictionState::from_active_flag(jurisdiction.active)) {
        return Err(ProvisionerError::Conflict(format!("jurisdiction {jurisdiction_id} is already active")));
    }

    match kind_of(ctx, &jurisdiction).await? {
        JurisdictionKind::ControlGroup => provision_control_group(ctx, jurisdiction).await,
        JurisdictionKind::Tier => provision_tier(ctx, jurisdiction).await,
        JurisdictionKind::Cluster => provision_cluster(ctx, jurisdiction).await,
    }
}

async fn provision_control_group(ctx: &EngineContext, jurisdiction: Jurisdiction) -> Result<Jurisdiction, ProvisionerError> {
    let merged = effective_configuration(ctx.store.as_ref(), &jurisdiction).await?;
    let platform = require_str(&merged, "platform")?;
    if platform != "aws" {
        return Err(ProvisionerError::Unsupported(platform.to_string()));
    }

    let bucket_name = control_group::bucket_name();
    let template = control_group::build(&jurisdiction.name, &bucket_name);
    let stack_name = control_group_stack_name(jurisdiction.id);
    let stack_id = ctx.cloud.submit_stack(&stack_name, &template, &[]).await?;

    ctx.store
        .set_assets(
            jurisdiction.id,
            json!({"cloudformation_stack": {"stack_id": stack_id, "status": null}, "s3_bucket": bucket_name}),
        )
        .await?;
    ctx.queue.enqueue(MonitorJob::Stack { jurisdiction_id: jurisdiction.id, interim: false, key: None }).await?;

    Ok(ctx.store.get_jurisdiction(jurisdiction.id).await?)
}

async fn provision_tier(ctx: &EngineContext, jurisdiction: Jurisdiction) -> Result<Jurisdiction, ProvisionerError> {
    let parent_id = jurisdiction
        .parent_id
        .ok_or_else(|| ProvisionerError::PrecondFail("tier jurisdiction requires a parent control group".to_string()))?;
    let parent = ctx.store.get_jurisdiction(parent_id).await?;
    if !parent.active {
        return Err(ProvisionerError::PrecondFail(format!("parent control group '{}' is inactive", parent.name)));
    }

    let merged = effective_configuration(ctx.store.as_ref(), &jurisdiction).await?;
    let template = tier::build(jurisdiction.id, &merged)?;
    let stack_name = tier_stack_name(jurisdiction.id);
    let stack_id = ctx.cloud.submit_stack(&stack_name, &template, &[]).await?;

    ctx.store.set_assets(jurisdiction.id, json!({"cloudformation_stack": {"stack_id": stack_id, "status": null}})).await?;
    ctx.queue.enqueue(MonitorJob::Stack { jurisdiction_id: jurisdiction.id, interim: false, key: None }).await?;

    Ok(ctx.store.get_jurisdiction(jurisdiction.id).await?)
}

async fn provision_cluster(ctx: &EngineContext, jurisdiction: Jurisdiction) -> Result<Jurisdiction, ProvisionerError> {
    let parent_id = jurisdiction
        .parent_id
        .ok_or_else(|| ProvisionerError::PrecondFail("cluster jurisdiction requires a parent tier".to_string()))?;
    let parent = ctx.store.get_jurisdiction(parent_id).await?;
    if !parent.active {
        return Err(ProvisionerError::PrecondFail(format!("parent tier '{}' is inactive", parent.name)));
    }

    let merged = effective_configuration(ctx.store.as_ref(), &jurisdiction).await?;
    let dedicated_etcd = bool_or(&merged, "dedicated_etcd", false);
    let cluster_region = region(ctx.store.as_ref(), &jurisdiction).await?;
    let available_azs = ctx.cloud.ec2_describe_availability_zones(&cluster_region).await?;

    let inputs = cluster_network::ClusterNetworkInputs {
        jurisdiction_id: jurisdiction.id,
        configuration: &merged,
        tier_vpc_export: &vpc_export_name(parent.id, "primary"),
        tier_route_table_export: &route_table_export_name(parent.id, "primary"),
        available_azs: &available_azs,
        dedicated_etcd,
    };
    let template = cluster_network::build(&inputs)?;
    let stack_name = cluster_network_stack_name(jurisdiction.id);
    let stack_id = ctx.cloud.submit_stack(&stack_name, &template, &[]).await?;

    ctx.store
        .set_assets(jurisdiction.id, json!({"cloudformation_stack": {"network": {"stack_id": stack_id, "status": null}}}))
        .await?;
    ctx.queue
        .enqueue(MonitorJob::Stack { jurisdiction_id: jurisdiction.id, interim: true, key: Some("network".to_string()) })
        .await?;
    ctx.queue.enqueue(MonitorJob::Network { jurisdiction_id: jurisdiction.id }).await?;
    ctx.queue.enqueue(MonitorJob::Nodes { jurisdiction_id: jurisdiction.id }).await?;

    Ok(ctx.store.get_jurisdiction(jurisdiction.id).await?)
}
