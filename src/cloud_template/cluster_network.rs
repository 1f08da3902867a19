//! Cluster-network template (§4.4): one subnet per `host_subnet_cidrs`
//! entry, round-robined across availability zones, plus the controller
//! (and optional etcd) ELBs attached to the first subnet.

use serde_json::{json, Value};

use super::builder::{assign_azs, controller_elb_export_name, etcd_elb_export_name, subnet_export_name};
use crate::errors::ProvisionerError;

pub struct ClusterNetworkInputs<'a> {
    pub jurisdiction_id: i64,
    pub configuration: &'a Value,
    pub tier_vpc_export: &'a str,
    pub tier_route_table_export: &'a str,
    pub available_azs: &'a [String],
    pub dedicated_etcd: bool,
}

fn host_subnet_cidrs(configuration: &Value) -> Result<Vec<String>, ProvisionerError> {
    configuration
        .get("host_subnet_cidrs")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .ok_or_else(|| ProvisionerError::PrecondFail("cluster configuration is missing 'host_subnet_cidrs'".to_string()))
}

pub fn build(inputs: &ClusterNetworkInputs<'_>) -> Result<Value, ProvisionerError> {
    let cidrs = host_subnet_cidrs(inputs.configuration)?;
    if cidrs.is_empty() {
        return Err(ProvisionerError::PrecondFail("cluster configuration 'host_subnet_cidrs' is empty".to_string()));
    }
    let azs = assign_azs(inputs.available_azs, cidrs.len())?;

    let mut resources = serde_json::Map::new();
    let mut outputs = serde_json::Map::new();

    for (i, (cidr, az)) in cidrs.iter().zip(azs.iter()).enumerate() {
        let subnet_logical_id = format!("Subnet{i}");
        let assoc_logical_id = format!("SubnetRouteTableAssociation{i}");
        resources.insert(
            subnet_logical_id.clone(),
            json!({
                "Type": "AWS::EC2::Subnet",
                "Properties": {
                    "VpcId": {"Fn::ImportValue": inputs.tier_vpc_export},
                    "CidrBlock": cidr,
                    "AvailabilityZone": az,
                    "MapPublicIpOnLaunch": true,
                    "Tags": [{"Key": "Name", "Value": format!("cluster-{}-subnet-{i}", inputs.jurisdiction_id)}],
                },
            }),
        );
        resources.insert(
            assoc_logical_id,
            json!({
                "Type": "AWS::EC2::SubnetRouteTableAssociation",
                "Properties": {
                    "SubnetId": {"Ref": subnet_logical_id},
                    "RouteTableId": {"Fn::ImportValue": inputs.tier_route_table_export},
                },
            }),
        );
        outputs.insert(
            format!("Subnet{i}Id"),
            json!({"Value": {"Ref": subnet_logical_id}, "Export": {"Name": subnet_export_name(inputs.jurisdiction_id, i)}}),
        );
    }

    let first_subnet_vpc = json!({"Fn::ImportValue": inputs.tier_vpc_export});

    resources.insert(
        "ControllerElbSecurityGroup".to_string(),
        json!({
            "Type": "AWS::EC2::SecurityGroup",
            "Properties": {
                "GroupDescription": "controller ELB ingress",
                "VpcId": first_subnet_vpc.clone(),
                "SecurityGroupIngress": [
                    {"IpProtocol": "tcp", "FromPort": 443, "ToPort": 443, "CidrIp": "0.0.0.0/0"},
                ],
            },
        }),
    );
    resources.insert(
        "ControllerElb".to_string(),
        json!({
            "Type": "AWS::ElasticLoadBalancing::LoadBalancer",
            "Properties": {
                "Scheme": "internet-facing",
                "Subnets": [{"Ref": "Subnet0"}],
                "SecurityGroups": [{"Ref": "ControllerElbSecurityGroup"}],
                "Listeners": [{"LoadBalancerPort": "443", "InstancePort": "443", "Protocol": "TCP"}],
                "Tags": [{"Key": "Name", "Value": format!("{}_controller", inputs.jurisdiction_id)}],
            },
        }),
    );
    outputs.insert(
        "ControllerElbDnsName".to_string(),
        json!({"Value": {"Fn::GetAtt": ["ControllerElb", "DNSName"]}, "Export": {"Name": controller_elb_export_name(inputs.jurisdiction_id)}}),
    );

    if inputs.dedicated_etcd {
        resources.insert(
            "EtcdElbSecurityGroup".to_string(),
            json!({
                "Type": "AWS::EC2::SecurityGroup",
                "Properties": {
                    "GroupDescription": "etcd internal ELB ingress",
                    "VpcId": first_subnet_vpc.clone(),
                    "SecurityGroupIngress": [
                        {"IpProtocol": "tcp", "FromPort": 2379, "ToPort": 2379, "CidrIp": "10.0.0.0/8"},
                    ],
                },
            }),
        );
        resources.insert(
            "EtcdElb".to_string(),
            json!({
                "Type": "AWS::ElasticLoadBalancing::LoadBalancer",
                "Properties": {
                    "Scheme": "internal",
                    "Subnets": [{"Ref": "Subnet0"}],
                    "SecurityGroups": [{"Ref": "EtcdElbSecurityGroup"}],
                    "Listeners": [{"LoadBalancerPort": "2379", "InstancePort": "2379", "Protocol": "TCP"}],
                    "Tags": [{"Key": "Name", "Value": format!("{}_etcd", inputs.jurisdiction_id)}],
                },
            }),
        );
        outputs.insert(
            "EtcdElbDnsName".to_string(),
            json!({"Value": {"Fn::GetAtt": ["EtcdElb", "DNSName"]}, "Export": {"Name": etcd_elb_export_name(inputs.jurisdiction_id)}}),
        );
    }

    Ok(json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": format!("Cluster network for jurisdiction {}", inputs.jurisdiction_id),
        "Resources": resources,
        "Outputs": outputs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn azs() -> Vec<String> {
        vec!["us-east-1a".to_string(), "us-east-1b".to_string()]
    }

    #[test]
    fn dedicated_etcd_adds_its_own_elb() {
        let config = json!({"host_subnet_cidrs": ["10.0.1.0/24", "10.0.2.0/24"]});
        let inputs = ClusterNetworkInputs {
            jurisdiction_id: 9,
            configuration: &config,
            tier_vpc_export: "7-vpc-primary",
            tier_route_table_export: "7-rt-primary",
            available_azs: &azs(),
            dedicated_etcd: true,
        };
        let template = build(&inputs).unwrap();
        assert!(template["Resources"].as_object().unwrap().contains_key("EtcdElb"));
        assert!(template["Outputs"].as_object().unwrap().contains_key("EtcdElbDnsName"));
    }

    #[test]
    fn non_dedicated_etcd_has_no_etcd_elb() {
        let config = json!({"host_subnet_cidrs": ["10.0.1.0/24"]});
        let inputs = ClusterNetworkInputs {
            jurisdiction_id: 9,
            configuration: &config,
            tier_vpc_export: "7-vpc-primary",
            tier_route_table_export: "7-rt-primary",
            available_azs: &azs(),
            dedicated_etcd: false,
        };
        let template = build(&inputs).unwrap();
        assert!(!template["Resources"].as_object().unwrap().contains_key("EtcdElb"));
    }

    #[test]
    fn subnet_exports_are_indexed() {
        let config = json!({"host_subnet_cidrs": ["10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]});
        let inputs = ClusterNetworkInputs {
            jurisdiction_id: 9,
            configuration: &config,
            tier_vpc_export: "7-vpc-primary",
            tier_route_table_export: "7-rt-primary",
            available_azs: &azs(),
            dedicated_etcd: false,
        };
        let template = build(&inputs).unwrap();
        let outputs = template["Outputs"].as_object().unwrap();
        assert_eq!(outputs["Subnet2Id"]["Export"]["Name"], json!(subnet_export_name(9, 2)));
    }
}
