//! Cluster-nodes template (§4.4): security groups, IAM roles, the worker
//! autoscaling group, pinned controller/etcd instances, and a recovery
//! alarm.
//!
//! The worker ASG's `VPCZoneIdentifier` is built from
//! [`subnet_export_name`] for every index in `0..subnet_count` — the same
//! function `cluster_network` used to export those subnets (§9(c)).

use serde_json::{json, Value};

use super::builder::{instance_export_name, security_group_export_name, subnet_export_name};
use crate::errors::ProvisionerError;

pub struct ClusterNodesInputs<'a> {
    pub jurisdiction_id: i64,
    pub configuration: &'a Value,
    pub tier_vpc_export: &'a str,
    pub subnet_count: usize,
    pub dedicated_etcd: bool,
    pub control_cluster_cidr: &'a str,
    pub worker_userdata_base64: &'a str,
    pub controller_userdata_base64: &'a str,
    pub etcd_userdata_base64: Option<&'a str>,
    pub worker_instance_type: &'a str,
    pub controller_instance_type: &'a str,
    pub etcd_instance_type: &'a str,
    pub ami_id: &'a str,
}

fn string_list(configuration: &Value, key: &str) -> Vec<String> {
    configuration
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

fn ingress(protocol: &str, from: i64, to: i64, source_sg: Option<&str>, cidr: Option<&str>) -> Value {
    let mut rule = serde_json::Map::new();
    rule.insert("IpProtocol".to_string(), json!(protocol));
    rule.insert("FromPort".to_string(), json!(from));
    rule.insert("ToPort".to_string(), json!(to));
    if let Some(sg) = source_sg {
        rule.insert("SourceSecurityGroupId".to_string(), json!({"Ref": sg}));
    }
    if let Some(cidr) = cidr {
        rule.insert("CidrIp".to_string(), json!(cidr));
    }
    Value::Object(rule)
}

pub fn build(inputs: &ClusterNodesInputs<'_>) -> Result<Value, ProvisionerError> {
    let controller_ips = string_list(inputs.configuration, "controller_ips");
    if controller_ips.is_empty() {
        return Err(ProvisionerError::PrecondFail("cluster configuration is missing 'controller_ips'".to_string()));
    }
    let etcd_ips = string_list(inputs.configuration, "etcd_ips");
    if inputs.dedicated_etcd && etcd_ips.is_empty() {
        return Err(ProvisionerError::PrecondFail("dedicated_etcd=true requires 'etcd_ips'".to_string()));
    }

    let vpc_ref = json!({"Fn::ImportValue": inputs.tier_vpc_export});
    let mut resources = serde_json::Map::new();
    let mut outputs = serde_json::Map::new();

    // --- security groups -------------------------------------------------
    resources.insert(
        "ControllerSecurityGroup".to_string(),
        json!({"Type": "AWS::EC2::SecurityGroup", "Properties": {"GroupDescription": "controller nodes", "VpcId": vpc_ref}}),
    );
    resources.insert(
        "WorkerSecurityGroup".to_string(),
        json!({"Type": "AWS::EC2::SecurityGroup", "Properties": {"GroupDescription": "worker nodes", "VpcId": vpc_ref}}),
    );
    if inputs.dedicated_etcd {
        resources.insert(
            "EtcdSecurityGroup".to_string(),
            json!({"Type": "AWS::EC2::SecurityGroup", "Properties": {"GroupDescription": "etcd nodes", "VpcId": vpc_ref}}),
        );
    }

    let mut controller_ingress = vec![
        ingress("tcp", 22, 22, None, Some("0.0.0.0/0")),
        ingress("tcp", 443, 443, None, Some("0.0.0.0/0")),
        ingress("tcp", 10255, 10255, Some("WorkerSecurityGroup"), None),
        ingress("udp", 8472, 8472, Some("WorkerSecurityGroup"), None),
    ];
    if !inputs.dedicated_etcd {
        // etcd is co-located on the controllers: workers reach it on 2379,
        // and controllers peer with each other on 2380.
        controller_ingress.push(ingress("tcp", 2379, 2379, Some("WorkerSecurityGroup"), None));
        controller_ingress.push(ingress("tcp", 2380, 2380, Some("ControllerSecurityGroup"), None));
    }

    let worker_ingress = vec![
        ingress("tcp", 22, 22, None, Some("0.0.0.0/0")),
        ingress("tcp", 30900, 30900, None, Some(inputs.control_cluster_cidr)),
        ingress("udp", 8472, 8472, Some("ControllerSecurityGroup"), None),
        ingress("udp", 8472, 8472, Some("WorkerSecurityGroup"), None),
        ingress("tcp", 10250, 10250, Some("ControllerSecurityGroup"), None),
        ingress("tcp", 10255, 10255, Some("WorkerSecurityGroup"), None),
        ingress("tcp", 4194, 4194, Some("ControllerSecurityGroup"), None),
    ];

    resources
        .get_mut("ControllerSecurityGroup")
        .unwrap()
        .get_mut("Properties")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .insert("SecurityGroupIngress".to_string(), json!(controller_ingress));
    resources
        .get_mut("WorkerSecurityGroup")
        .unwrap()
        .get_mut("Properties")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .insert("SecurityGroupIngress".to_string(), json!(worker_ingress));

    if inputs.dedicated_etcd {
        let etcd_ingress = vec![
            ingress("tcp", 2379, 2380, Some("EtcdSecurityGroup"), None),
            ingress("tcp", 2379, 2379, Some("ControllerSecurityGroup"), None),
            ingress("tcp", 2379, 2379, Some("WorkerSecurityGroup"), None),
        ];
        resources
            .get_mut("EtcdSecurityGroup")
            .unwrap()
            .get_mut("Properties")
            .unwrap()
            .as_object_mut()
            .unwrap()
            .insert("SecurityGroupIngress".to_string(), json!(etcd_ingress));
        outputs.insert(
            "EtcdSecurityGroupId".to_string(),
            json!({"Value": {"Ref": "EtcdSecurityGroup"}, "Export": {"Name": security_group_export_name(inputs.jurisdiction_id, "etcd")}}),
        );
    }
    outputs.insert(
        "ControllerSecurityGroupId".to_string(),
        json!({"Value": {"Ref": "ControllerSecurityGroup"}, "Export": {"Name": security_group_export_name(inputs.jurisdiction_id, "controller")}}),
    );
    outputs.insert(
        "WorkerSecurityGroupId".to_string(),
        json!({"Value": {"Ref": "WorkerSecurityGroup"}, "Export": {"Name": security_group_export_name(inputs.jurisdiction_id, "worker")}}),
    );

    // --- IAM ---------------------------------------------------------------
    resources.insert(
        "WorkerRole".to_string(),
        json!({
            "Type": "AWS::IAM::Role",
            "Properties": {
                "AssumeRolePolicyDocument": ec2_assume_role_policy(),
                "Policies": [{
                    "PolicyName": "worker-policy",
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [
                            {"Effect": "Allow", "Action": ["ec2:DescribeInstances", "ec2:AttachVolume", "ec2:DetachVolume"], "Resource": "*"},
                            {"Effect": "Allow", "Action": ["kms:Decrypt"], "Resource": "*"},
                            {"Effect": "Allow", "Action": ["ecr:GetAuthorizationToken", "ecr:BatchGetImage", "ecr:GetDownloadUrlForLayer"], "Resource": "*"},
                        ],
                    },
                }],
            },
        }),
    );
    resources.insert("WorkerInstanceProfile".to_string(), json!({"Type": "AWS::IAM::InstanceProfile", "Properties": {"Roles": [{"Ref": "WorkerRole"}]}}));
    resources.insert(
        "ControllerRole".to_string(),
        json!({
            "Type": "AWS::IAM::Role",
            "Properties": {
                "AssumeRolePolicyDocument": ec2_assume_role_policy(),
                "Policies": [{
                    "PolicyName": "controller-policy",
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [
                            {"Effect": "Allow", "Action": ["ec2:*"], "Resource": "*"},
                            {"Effect": "Allow", "Action": ["elasticloadbalancing:*"], "Resource": "*"},
                            {"Effect": "Allow", "Action": ["kms:Decrypt"], "Resource": "*"},
                        ],
                    },
                }],
            },
        }),
    );
    resources.insert("ControllerInstanceProfile".to_string(), json!({"Type": "AWS::IAM::InstanceProfile", "Properties": {"Roles": [{"Ref": "ControllerRole"}]}}));

    // --- subnet list for the ASG (the §9(c) fix) ---------------------------
    let subnet_refs: Vec<Value> = (0..inputs.subnet_count).map(|i| json!({"Fn::ImportValue": subnet_export_name(inputs.jurisdiction_id, i)})).collect();

    // --- worker launch config + autoscaling group ---------------------------
    resources.insert(
        "WorkerLaunchConfiguration".to_string(),
        json!({
            "Type": "AWS::AutoScaling::LaunchConfiguration",
            "Properties": {
                "ImageId": inputs.ami_id,
                "InstanceType": inputs.worker_instance_type,
                "SecurityGroups": [{"Ref": "WorkerSecurityGroup"}],
                "IamInstanceProfile": {"Ref": "WorkerInstanceProfile"},
                "UserData": inputs.worker_userdata_base64,
            },
        }),
    );
    let initial_workers = inputs.configuration.get("initial_workers").and_then(Value::as_u64).unwrap_or(1);
    resources.insert(
        "WorkerAutoScalingGroup".to_string(),
        json!({
            "Type": "AWS::AutoScaling::AutoScalingGroup",
            "Properties": {
                "LaunchConfigurationName": {"Ref": "WorkerLaunchConfiguration"},
                "MinSize": initial_workers,
                "MaxSize": initial_workers,
                "DesiredCapacity": initial_workers,
                "VPCZoneIdentifier": subnet_refs,
                "Tags": [{"Key": "Name", "Value": format!("cluster-{}-worker", inputs.jurisdiction_id), "PropagateAtLaunch": true}],
            },
        }),
    );

    // --- pinned controller instances ----------------------------------------
    let subnet0 = json!({"Fn::ImportValue": subnet_export_name(inputs.jurisdiction_id, 0)});
    for ip in &controller_ips {
        let logical_id = format!("ControllerInstance{}", ip.replace('.', ""));
        resources.insert(
            logical_id.clone(),
            json!({
                "Type": "AWS::EC2::Instance",
                "Properties": {
                    "ImageId": inputs.ami_id,
                    "InstanceType": inputs.controller_instance_type,
                    "SubnetId": subnet0,
                    "PrivateIpAddress": ip,
                    "SecurityGroupIds": [{"Ref": "ControllerSecurityGroup"}],
                    "IamInstanceProfile": {"Ref": "ControllerInstanceProfile"},
                    "UserData": inputs.controller_userdata_base64,
                    "Tags": [{"Key": "Name", "Value": format!("cluster-{}-controller-{ip}", inputs.jurisdiction_id)}],
                },
            }),
        );
        outputs.insert(
            format!("ControllerInstance{}Id", ip.replace('.', "")),
            json!({"Value": {"Ref": logical_id}, "Export": {"Name": instance_export_name(inputs.jurisdiction_id, "controller", ip)}}),
        );
    }

    if inputs.dedicated_etcd {
        let etcd_userdata = inputs.etcd_userdata_base64.ok_or_else(|| ProvisionerError::PrecondFail("dedicated_etcd=true requires rendered etcd userdata".to_string()))?;
        for ip in &etcd_ips {
            let logical_id = format!("EtcdInstance{}", ip.replace('.', ""));
            resources.insert(
                logical_id.clone(),
                json!({
                    "Type": "AWS::EC2::Instance",
                    "Properties": {
                        "ImageId": inputs.ami_id,
                        "InstanceType": inputs.etcd_instance_type,
                        "SubnetId": subnet0,
                        "PrivateIpAddress": ip,
                        "SecurityGroupIds": [{"Ref": "EtcdSecurityGroup"}],
                        "UserData": etcd_userdata,
                        "Tags": [{"Key": "Name", "Value": format!("cluster-{}-etcd-{ip}", inputs.jurisdiction_id)}],
                    },
                }),
            );
            outputs.insert(
                format!("EtcdInstance{}Id", ip.replace('.', "")),
                json!({"Value": {"Ref": logical_id}, "Export": {"Name": instance_export_name(inputs.jurisdiction_id, "etcd", ip)}}),
            );
        }
    }

    // --- recovery alarm, one per controller instance ------------------------
    for ip in &controller_ips {
        let instance_logical_id = format!("ControllerInstance{}", ip.replace('.', ""));
        let alarm_logical_id = format!("RecoverAlarm{}", ip.replace('.', ""));
        resources.insert(
            alarm_logical_id,
            json!({
                "Type": "AWS::CloudWatch::Alarm",
                "Properties": {
                    "AlarmDescription": format!("recover {ip} on system status check failure"),
                    "Namespace": "AWS/EC2",
                    "MetricName": "StatusCheckFailed_System",
                    "Statistic": "Minimum",
                    "Period": 60,
                    "EvaluationPeriods": 2,
                    "Threshold": 0,
                    "ComparisonOperator": "GreaterThanThreshold",
                    "Dimensions": [{"Name": "InstanceId", "Value": {"Ref": instance_logical_id}}],
                    "AlarmActions": [{"Fn::Sub": "arn:aws:automate:${AWS::Region}:ec2:recover"}],
                },
            }),
        );
    }

    Ok(json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": format!("Cluster nodes for jurisdiction {}", inputs.jurisdiction_id),
        "Resources": resources,
        "Outputs": outputs,
    }))
}

fn ec2_assume_role_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{"Effect": "Allow", "Principal": {"Service": "ec2.amazonaws.com"}, "Action": "sts:AssumeRole"}],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_config(dedicated_etcd: bool) -> Value {
        let mut config = json!({
            "controller_ips": ["10.0.0.50"],
            "initial_workers": 3,
        });
        if dedicated_etcd {
            config["etcd_ips"] = json!(["10.0.0.60"]);
        }
        config
    }

    #[test]
    fn dedicated_etcd_moves_ingress_off_the_controller_security_group() {
        let config = base_config(true);
        let inputs = ClusterNodesInputs {
            jurisdiction_id: 5,
            configuration: &config,
            tier_vpc_export: "1-vpc-primary",
            subnet_count: 2,
            dedicated_etcd: true,
            control_cluster_cidr: "10.0.0.0/16",
            worker_userdata_base64: "d29ya2Vy",
            controller_userdata_base64: "Y29udHJvbGxlcg==",
            etcd_userdata_base64: Some("ZXRjZA=="),
            worker_instance_type: "m5.large",
            controller_instance_type: "m5.large",
            etcd_instance_type: "m5.large",
            ami_id: "ami-0123456789",
        };
        let template = build(&inputs).unwrap();
        assert!(template["Resources"].as_object().unwrap().contains_key("EtcdSecurityGroup"));
    }

    #[test]
    fn colocated_etcd_lets_workers_reach_the_controller_on_2379_not_the_reverse() {
        let config = base_config(false);
        let inputs = ClusterNodesInputs {
            jurisdiction_id: 5,
            configuration: &config,
            tier_vpc_export: "1-vpc-primary",
            subnet_count: 2,
            dedicated_etcd: false,
            control_cluster_cidr: "10.0.0.0/16",
            worker_userdata_base64: "d29ya2Vy",
            controller_userdata_base64: "Y29udHJvbGxlcg==",
            etcd_userdata_base64: None,
            worker_instance_type: "m5.large",
            controller_instance_type: "m5.large",
            etcd_instance_type: "m5.large",
            ami_id: "ami-0123456789",
        };
        let template = build(&inputs).unwrap();
        let controller_rules = template["Resources"]["ControllerSecurityGroup"]["Properties"]["SecurityGroupIngress"].as_array().unwrap();
        assert!(controller_rules
            .iter()
            .any(|rule| rule["FromPort"] == json!(2379) && rule["SourceSecurityGroupId"] == json!({"Ref": "WorkerSecurityGroup"})));
        let worker_rules = template["Resources"]["WorkerSecurityGroup"]["Properties"]["SecurityGroupIngress"].as_array().unwrap();
        assert!(!worker_rules.iter().any(|rule| rule["FromPort"] == json!(2379)));
    }

    #[test]
    fn asg_references_every_exported_subnet_by_index() {
        let config = base_config(false);
        let inputs = ClusterNodesInputs {
            jurisdiction_id: 5,
            configuration: &config,
            tier_vpc_export: "1-vpc-primary",
            subnet_count: 3,
            dedicated_etcd: false,
            control_cluster_cidr: "10.0.0.0/16",
            worker_userdata_base64: "d29ya2Vy",
            controller_userdata_base64: "Y29udHJvbGxlcg==",
            etcd_userdata_base64: None,
            worker_instance_type: "m5.large",
            controller_instance_type: "m5.large",
            etcd_instance_type: "m5.large",
            ami_id: "ami-0123456789",
        };
        let template = build(&inputs).unwrap();
        let zone_ids = template["Resources"]["WorkerAutoScalingGroup"]["Properties"]["VPCZoneIdentifier"].as_array().unwrap();
        assert_eq!(zone_ids.len(), 3);
        assert_eq!(zone_ids[2]["Fn::ImportValue"], json!(subnet_export_name(5, 2)));
    }

    #[test]
    fn missing_controller_ips_is_a_precondition_failure() {
        let config = json!({});
        let inputs = ClusterNodesInputs {
            jurisdiction_id: 5,
            configuration: &config,
            tier_vpc_export: "1-vpc-primary",
            subnet_count: 1,
            dedicated_etcd: false,
            control_cluster_cidr: "10.0.0.0/16",
            worker_userdata_base64: "",
            controller_userdata_base64: "",
            etcd_userdata_base64: None,
            worker_instance_type: "m5.large",
            controller_instance_type: "m5.large",
            etcd_instance_type: "m5.large",
            ami_id: "ami-0123456789",
        };
        assert!(build(&inputs).is_err());
    }
}
