//! Monitor jobs (§4.6): background tasks that poll cloud and store state
//! and advance a jurisdiction's status, possibly enqueuing a successor.
//!
//! Every monitor obeys the read-modify-write idiom of §5: no database
//! transaction is held across a cloud call. `merge_assets` is the only
//! primitive that touches `assets`, so concurrent monitors never clobber
//! each other's keys, and re-delivery of the same job is always safe.

use std::time::Duration;

use serde_json::{json, Value};

use super::json_ext::{bool_or, ip_list, require_ip, require_str, str_list};
use super::jobs::MonitorJob;
use super::EngineContext;
use crate::cloud::status;
use crate::cloud_template::builder::{cluster_nodes_stack_name, instance_export_name};
use crate::cloud_template::cluster_nodes::{self, ClusterNodesInputs};
use crate::config_resolver::{effective_configuration, region};
use crate::errors::ProvisionerError;
use crate::pki::{self, ApiServerSan};
use crate::store::models::Jurisdiction;
use crate::userdata::{self, RenderContext, WrappedCredentials};

#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_checks: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy { interval: Duration::from_secs(30), max_checks: 30 }
    }
}

fn json_pointer_for(key: &Option<String>) -> String {
    match key {
        Some(k) => format!("/cloudformation_stack/{k}"),
        None => "/cloudformation_stack".to_string(),
    }
}

async fn poll_cloud_until_terminal(
    cloud: &dyn crate::cloud::CloudAdapter,
    stack_id: &str,
    policy: &PollPolicy,
) -> Result<String, ProvisionerError> {
    for check in 0..policy.max_checks {
        let status = cloud.describe_stack(stack_id).await?;
        if status::is_terminal(&status) {
            return Ok(status);
        }
        if check + 1 < policy.max_checks {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(ProvisionerError::Timeout)
}

async fn poll_store_until(
    ctx: &EngineContext,
    jurisdiction_id: i64,
    pointer: &str,
    expected: &str,
    policy: &PollPolicy,
) -> Result<(), ProvisionerError> {
    for check in 0..policy.max_checks {
        let jurisdiction = ctx.store.get_jurisdiction(jurisdiction_id).await?;
        let assets = jurisdiction.assets_or_empty();
        let observed = assets.pointer(pointer).and_then(Value::as_str);
        if observed == Some(expected) {
            return Ok(());
        }
        if check + 1 < policy.max_checks {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(ProvisionerError::Timeout)
}

/// `MonitorStack(j, interim, key)` — §4.6.
pub async fn monitor_stack(
    ctx: &EngineContext,
    jurisdiction_id: i64,
    interim: bool,
    key: Option<String>,
    policy: &PollPolicy,
) -> Result<(), ProvisionerError> {
    let jurisdiction = ctx.store.get_jurisdiction(jurisdiction_id).await?;
    let assets = jurisdiction.assets_or_empty();
    let pointer = format!("{}/stack_id", json_pointer_for(&key));
    let stack_id = assets
        .pointer(&pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| ProvisionerError::PrecondFail(format!("jurisdiction {jurisdiction_id} has no stack id at {pointer}")))?
        .to_string();

    let status = poll_cloud_until_terminal(ctx.cloud.as_ref(), &stack_id, policy).await?;

    let status_pointer = format!("{}/status", json_pointer_for(&key));
    let status_for_merge = status.clone();
    ctx.store
        .merge_assets(
            jurisdiction_id,
            Box::new(move |assets: &mut Value| {
                set_at_pointer(assets, &status_pointer, json!(status_for_merge));
            }),
        )
        .await?;

    if status::is_terminal_success(&status) && !interim {
        ctx.store.set_active(jurisdiction_id, true).await?;
    }

    Ok(())
}

fn set_at_pointer(root: &mut Value, pointer: &str, value: Value) {
    let segments: Vec<&str> = pointer.trim_start_matches('/').split('/').collect();
    let mut cursor = root;
    for segment in &segments[..segments.len() - 1] {
        if !cursor.is_object() {
            *cursor = json!({});
        }
        cursor = cursor.as_object_mut().unwrap().entry(segment.to_string()).or_insert_with(|| json!({}));
    }
    if !cursor.is_object() {
        *cursor = json!({});
    }
    cursor.as_object_mut().unwrap().insert(segments[segments.len() - 1].to_string(), value);
}

fn userdata_template_name(configuration: &Value, role: &str) -> Result<String, ProvisionerError> {
    configuration
        .get("userdata_template_ids")
        .and_then(|ids| ids.get(role))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProvisionerError::PrecondFail(format!("configuration is missing userdata_template_ids.{role}")))
}

async fn wrapped_credentials(
    ctx: &EngineContext,
    kms_key_id: &str,
    pki: &pki::ClusterPki,
    leaf: &pki::KeyPair,
) -> Result<WrappedCredentials, ProvisionerError> {
    let ca_cert = userdata::wrap_credential(ctx.cloud.as_ref(), kms_key_id, &pki.ca.certificate_pem).await?;
    let cert = userdata::wrap_credential(ctx.cloud.as_ref(), kms_key_id, &leaf.certificate_pem).await?;
    let key = userdata::wrap_credential(ctx.cloud.as_ref(), kms_key_id, &leaf.private_key_pem).await?;
    Ok(WrappedCredentials { ca_cert, cert, key })
}

/// `MonitorNetwork(j)` — §4.6.
pub async fn monitor_network(ctx: &EngineContext, jurisdiction_id: i64, policy: &PollPolicy) -> Result<(), ProvisionerError> {
    poll_store_until(ctx, jurisdiction_id, "/cloudformation_stack/network/status", "CREATE_COMPLETE", policy).await?;

    let jurisdiction: Jurisdiction = ctx.store.get_jurisdiction(jurisdiction_id).await?;
    let merged = effective_configuration(ctx.store.as_ref(), &jurisdiction).await?;
    let cluster_name = jurisdiction.name.clone();
    let dedicated_etcd = bool_or(&merged, "dedicated_etcd", false);

    let grandparent_bucket = {
        let parent_id = jurisdiction.parent_id.ok_or_else(|| ProvisionerError::PrecondFail("cluster has no parent tier".to_string()))?;
        let parent = ctx.store.get_jurisdiction(parent_id).await?;
        let control_group_id = parent.parent_id.ok_or_else(|| ProvisionerError::PrecondFail("tier has no parent control group".to_string()))?;
        let control_group = ctx.store.get_jurisdiction(control_group_id).await?;
        control_group
            .assets_or_empty()
            .get("s3_bucket")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ProvisionerError::PrecondFail("control group has no s3_bucket asset".to_string()))?
    };

    let controller_lb = ctx
        .cloud
        .elb_describe_load_balancers_by_tag(&format!("{cluster_name}_controller"))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ProvisionerError::Cloud(crate::errors::CloudError::MissingExport(format!("{cluster_name}_controller"))))?;
    let etcd_lb = if dedicated_etcd {
        Some(
            ctx.cloud
                .elb_describe_load_balancers_by_tag(&format!("{cluster_name}_etcd"))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ProvisionerError::Cloud(crate::errors::CloudError::MissingExport(format!("{cluster_name}_etcd"))))?,
        )
    } else {
        None
    };

    let apiserver_san = ApiServerSan {
        controller_elb_dns: controller_lb.dns_name.clone(),
        kubernetes_api_dns_names: str_list(&merged, "kubernetes_api_dns_names"),
        controller_ips: ip_list(&merged, "controller_ips"),
        kubernetes_api_ip: require_ip(&merged, "kubernetes_api_ip")?,
    };
    let cluster_pki = pki::generate_cluster_pki(&cluster_name, &apiserver_san)?;

    for (name, pem) in cluster_pki.credential_files() {
        ctx.cloud.put_object(&grandparent_bucket, &format!("{cluster_name}/credentials/{name}.pem"), pem).await?;
    }

    let ec2_key_pair_name = format!("{cluster_name}-keypair");
    let key_material = ctx.cloud.create_key_pair(&ec2_key_pair_name).await?;
    ctx.cloud
        .put_object(&grandparent_bucket, &format!("{cluster_name}/credentials/{ec2_key_pair_name}.pem"), key_material.as_bytes())
        .await?;

    let kms_key_id = ctx.cloud.kms_create_key(&format!("{cluster_name} cluster key")).await?;
    let kms_alias = format!("alias/{cluster_name}");
    ctx.cloud.kms_create_alias(&kms_alias, &kms_key_id).await?;

    let controller_wrapped = wrapped_credentials(ctx, &kms_key_id, &cluster_pki, &cluster_pki.apiserver).await?;
    let worker_wrapped = wrapped_credentials(ctx, &kms_key_id, &cluster_pki, &cluster_pki.worker).await?;
    let etcd_wrapped = wrapped_credentials(ctx, &kms_key_id, &cluster_pki, &cluster_pki.worker).await?;

    let cluster_region = region(ctx.store.as_ref(), &jurisdiction).await?;

    let controller_template = userdata_template_name(&merged, "controller")?;
    let worker_template = userdata_template_name(&merged, "worker")?;

    let controller_userdata = userdata::render(
        ctx.store.as_ref(),
        &controller_template,
        RenderContext {
            role: crate::store::models::NodeRole::Controller,
            index: 0,
            region: &cluster_region,
            controller_elb_dns: &controller_lb.dns_name,
            etcd_elb_dns: etcd_lb.as_ref().map(|lb| lb.dns_name.as_str()),
            credentials: &controller_wrapped,
            merged_configuration: &merged,
        },
    )
    .await?;
    let worker_userdata = userdata::render(
        ctx.store.as_ref(),
        &worker_template,
        RenderContext {
            role: crate::store::models::NodeRole::Worker,
            index: 0,
            region: &cluster_region,
            controller_elb_dns: &controller_lb.dns_name,
            etcd_elb_dns: etcd_lb.as_ref().map(|lb| lb.dns_name.as_str()),
            credentials: &worker_wrapped,
            merged_configuration: &merged,
        },
    )
    .await?;
    let etcd_userdata = if dedicated_etcd {
        let etcd_template = userdata_template_name(&merged, "etcd")?;
        Some(
            userdata::render(
                ctx.store.as_ref(),
                &etcd_template,
                RenderContext {
                    role: crate::store::models::NodeRole::Etcd,
                    index: 0,
                    region: &cluster_region,
                    controller_elb_dns: &controller_lb.dns_name,
                    etcd_elb_dns: etcd_lb.as_ref().map(|lb| lb.dns_name.as_str()),
                    credentials: &etcd_wrapped,
                    merged_configuration: &merged,
                },
            )
            .await?,
        )
    } else {
        None
    };

    for (role, rendered) in [("controller", Some(&controller_userdata)), ("worker", Some(&worker_userdata)), ("etcd", etcd_userdata.as_ref())] {
        if let Some(rendered) = rendered {
            ctx.cloud
                .put_object(&grandparent_bucket, &format!("{cluster_name}/userdata/{role}.txt"), rendered.plaintext.as_bytes())
                .await?;
        }
    }

    let subnet_count = merged.get("host_subnet_cidrs").and_then(Value::as_array).map(Vec::len).unwrap_or(0);
    let coreos_channel = merged.get("coreos_release_channel").and_then(Value::as_str).unwrap_or("stable");
    let ami_id = format!("ami-coreos-{coreos_channel}");
    let parent_id = jurisdiction.parent_id.ok_or_else(|| ProvisionerError::PrecondFail("cluster has no parent tier".to_string()))?;
    let tier_vpc_export = crate::cloud_template::builder::vpc_export_name(parent_id, "primary");

    let nodes_inputs = ClusterNodesInputs {
        jurisdiction_id: jurisdiction.id,
        configuration: &merged,
        tier_vpc_export: &tier_vpc_export,
        subnet_count,
        dedicated_etcd,
        control_cluster_cidr: require_str(&merged, "control_cluster").unwrap_or("0.0.0.0/0"),
        worker_userdata_base64: &worker_userdata.compressed_base64,
        controller_userdata_base64: &controller_userdata.compressed_base64,
        etcd_userdata_base64: etcd_userdata.as_ref().map(|u| u.compressed_base64.as_str()),
        worker_instance_type: merged.get("worker_instance_type").and_then(Value::as_str).unwrap_or("m5.large"),
        controller_instance_type: merged.get("controller_instance_type").and_then(Value::as_str).unwrap_or("m5.large"),
        etcd_instance_type: merged.get("etcd_instance_type").and_then(Value::as_str).unwrap_or("m5.large"),
        ami_id: &ami_id,
    };
    let nodes_template = cluster_nodes::build(&nodes_inputs)?;

    let nodes_stack_name = cluster_nodes_stack_name(jurisdiction.id);
    let nodes_stack_id = ctx.cloud.submit_stack(&nodes_stack_name, &nodes_template, &["CAPABILITY_IAM"]).await?;

    let controller_lb_name = controller_lb.name.clone();
    let etcd_lb_name = etcd_lb.as_ref().map(|lb| lb.name.clone());
    let controller_dns = controller_lb.dns_name.clone();
    let etcd_dns = etcd_lb.as_ref().map(|lb| lb.dns_name.clone());

    ctx.store
        .merge_assets(
            jurisdiction.id,
            Box::new(move |assets: &mut Value| {
                set_at_pointer(assets, "/cloudformation_stack/nodes/stack_id", json!(nodes_stack_id));
                set_at_pointer(assets, "/cloudformation_stack/nodes/status", Value::Null);
                set_at_pointer(assets, "/ec2_key_pair", json!(ec2_key_pair_name));
                set_at_pointer(assets, "/kms_key/id", json!(kms_key_id));
                set_at_pointer(assets, "/kms_key/alias", json!(kms_alias));
                set_at_pointer(assets, "/load_balancers/controller/name", json!(controller_lb_name));
                set_at_pointer(assets, "/load_balancers/controller/dns_name", json!(controller_dns));
                if let Some(name) = etcd_lb_name {
                    set_at_pointer(assets, "/load_balancers/etcd/name", json!(name));
                }
                if let Some(dns) = etcd_dns {
                    set_at_pointer(assets, "/load_balancers/etcd/dns_name", json!(dns));
                }
            }),
        )
        .await?;

    ctx.queue
        .enqueue(MonitorJob::Stack { jurisdiction_id: jurisdiction.id, interim: true, key: Some("nodes".to_string()) })
        .await?;

    Ok(())
}

/// `MonitorNodes(j)` — §4.6.
pub async fn monitor_nodes(ctx: &EngineContext, jurisdiction_id: i64, policy: &PollPolicy) -> Result<(), ProvisionerError> {
    poll_store_until(ctx, jurisdiction_id, "/cloudformation_stack/nodes/status", "CREATE_COMPLETE", policy).await?;

    let jurisdiction = ctx.store.get_jurisdiction(jurisdiction_id).await?;
    let merged = effective_configuration(ctx.store.as_ref(), &jurisdiction).await?;
    let assets = jurisdiction.assets_or_empty();
    let cluster_name = jurisdiction.name.clone();

    let exports = ctx.cloud.list_exports().await?;
    let export_value = |name: &str| exports.iter().find(|e| e.name == name).map(|e| e.value.clone());

    let controller_ips = str_list(&merged, "controller_ips");
    let controller_instance_ids: Vec<String> = controller_ips
        .iter()
        .filter_map(|ip| export_value(&instance_export_name(jurisdiction.id, "controller", ip)))
        .collect();
    if controller_instance_ids.len() != controller_ips.len() {
        return Err(ProvisionerError::Cloud(crate::errors::CloudError::MissingExport(format!(
            "one or more controller instance exports for cluster {cluster_name}"
        ))));
    }

    let controller_lb_name = assets
        .pointer("/load_balancers/controller/name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProvisionerError::PrecondFail("jurisdiction has no recorded controller load balancer".to_string()))?;
    ctx.cloud.elb_register_instances(controller_lb_name, &controller_instance_ids).await?;

    if bool_or(&merged, "dedicated_etcd", false) {
        let etcd_ips = str_list(&merged, "etcd_ips");
        let etcd_instance_ids: Vec<String> =
            etcd_ips.iter().filter_map(|ip| export_value(&instance_export_name(jurisdiction.id, "etcd", ip))).collect();
        if let Some(etcd_lb_name) = assets.pointer("/load_balancers/etcd/name").and_then(Value::as_str) {
            if !etcd_instance_ids.is_empty() {
                ctx.cloud.elb_register_instances(etcd_lb_name, &etcd_instance_ids).await?;
            }
        }
    }

    ctx.store.set_active(jurisdiction.id, true).await?;
    Ok(())
}

/// `MonitorDecommission(j, nodes_stack_id, network_stack_id)` — §4.6:
/// polls the nodes stack and, on `DELETE_COMPLETE`, deletes the network
/// stack.
pub async fn monitor_decommission(
    ctx: &EngineContext,
    jurisdiction_id: i64,
    nodes_stack_id: &str,
    network_stack_id: &str,
    policy: &PollPolicy,
) -> Result<(), ProvisionerError> {
    let status = poll_cloud_until_terminal(ctx.cloud.as_ref(), nodes_stack_id, policy).await?;
    let status_for_merge = status.clone();
    ctx.store
        .merge_assets(
            jurisdiction_id,
            Box::new(move |assets: &mut Value| {
                set_at_pointer(assets, "/cloudformation_stack/nodes/status", json!(status_for_merge));
            }),
        )
        .await?;

    if status == "DELETE_COMPLETE" {
        ctx.cloud.delete_stack(network_stack_id).await?;
    }
    Ok(())
}
