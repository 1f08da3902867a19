//! Tier template (§4.4): one VPC (primary), plus a second (support) when
//! `support_cluster=true`, each with its own route table, internet
//! gateway, default route, and gateway attachment.

use serde_json::{json, Value};

use super::builder::{route_table_export_name, vpc_export_name};
use crate::errors::ProvisionerError;

struct VpcSpec {
    label: &'static str,
    cidr: String,
}

fn cidr_for(label: &str, configuration: &Value) -> Result<String, ProvisionerError> {
    configuration
        .get(format!("{label}_cluster_cidr"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProvisionerError::PrecondFail(format!("tier configuration is missing '{label}_cluster_cidr'")))
}

pub fn build(jurisdiction_id: i64, configuration: &Value) -> Result<Value, ProvisionerError> {
    let support_cluster = configuration.get("support_cluster").and_then(Value::as_bool).unwrap_or(false);

    let mut specs = vec![VpcSpec { label: "primary", cidr: cidr_for("primary", configuration)? }];
    if support_cluster {
        specs.push(VpcSpec { label: "support", cidr: cidr_for("support", configuration)? });
    }

    let mut resources = serde_json::Map::new();
    let mut outputs = serde_json::Map::new();

    for spec in &specs {
        let label = spec.label;
        let vpc_logical_id = format!("Vpc{}", title_case(label));
        let igw_logical_id = format!("InternetGateway{}", title_case(label));
        let attachment_logical_id = format!("GatewayAttachment{}", title_case(label));
        let rt_logical_id = format!("RouteTable{}", title_case(label));
        let route_logical_id = format!("DefaultRoute{}", title_case(label));

        resources.insert(
            vpc_logical_id.clone(),
            json!({
                "Type": "AWS::EC2::VPC",
                "Properties": {
                    "CidrBlock": spec.cidr,
                    "EnableDnsSupport": true,
                    "EnableDnsHostnames": true,
                    "Tags": [{"Key": "Name", "Value": format!("tier-{jurisdiction_id}-{label}")}],
                },
            }),
        );
        resources.insert(igw_logical_id.clone(), json!({"Type": "AWS::EC2::InternetGateway"}));
        resources.insert(
            attachment_logical_id,
            json!({
                "Type": "AWS::EC2::VPCGatewayAttachment",
                "Properties": {
                    "VpcId": {"Ref": vpc_logical_id},
                    "InternetGatewayId": {"Ref": igw_logical_id},
                },
            }),
        );
        resources.insert(
            rt_logical_id.clone(),
            json!({
                "Type": "AWS::EC2::RouteTable",
                "Properties": {"VpcId": {"Ref": vpc_logical_id}},
            }),
        );
        resources.insert(
            route_logical_id,
            json!({
                "Type": "AWS::EC2::Route",
                "DependsOn": format!("GatewayAttachment{}", title_case(label)),
                "Properties": {
                    "RouteTableId": {"Ref": rt_logical_id},
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": {"Ref": igw_logical_id},
                },
            }),
        );

        outputs.insert(
            format!("Vpc{}Id", title_case(label)),
            json!({"Value": {"Ref": vpc_logical_id}, "Export": {"Name": vpc_export_name(jurisdiction_id, label)}}),
        );
        outputs.insert(
            format!("RouteTable{}Id", title_case(label)),
            json!({"Value": {"Ref": rt_logical_id}, "Export": {"Name": route_table_export_name(jurisdiction_id, label)}}),
        );
    }

    Ok(json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": format!("Tier network for jurisdiction {jurisdiction_id}"),
        "Resources": resources,
        "Outputs": outputs,
    }))
}

fn title_case(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn support_cluster_false_produces_a_single_vpc() {
        let config = json!({"primary_cluster_cidr": "10.0.0.0/16", "support_cluster": false});
        let template = build(7, &config).unwrap();
        let resources = template["Resources"].as_object().unwrap();
        assert!(resources.contains_key("VpcPrimary"));
        assert!(!resources.contains_key("VpcSupport"));
    }

    #[test]
    fn support_cluster_true_produces_two_vpcs() {
        let config = json!({
            "primary_cluster_cidr": "10.0.0.0/16",
            "support_cluster": true,
            "support_cluster_cidr": "10.1.0.0/16",
        });
        let template = build(7, &config).unwrap();
        let resources = template["Resources"].as_object().unwrap();
        assert!(resources.contains_key("VpcPrimary"));
        assert!(resources.contains_key("VpcSupport"));
    }

    #[test]
    fn missing_cidr_is_a_precondition_failure() {
        let config = json!({});
        assert!(build(7, &config).is_err());
    }
}
