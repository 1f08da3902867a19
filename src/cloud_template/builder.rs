//! Shared naming and AZ-assignment helpers used by all four template
//! shapes (§4.4). Keeping these in one place is what fixes the
//! `VPCZoneIdentifier` bug in §9(c): cluster_network and cluster_nodes both
//! derive their subnet list from [`subnet_export_name`], so the
//! autoscaling group references exactly the subnets that were created.

use crate::errors::ProvisionerError;

/// AWS does not guarantee `us-east-1c` supports every instance type this
/// system provisions into; the reference excludes it from the round-robin.
const EXCLUDED_AZ: &str = "us-east-1c";

pub fn control_group_stack_name(jurisdiction_id: i64) -> String {
    format!("ControlGroup{jurisdiction_id:02}")
}

pub fn tier_stack_name(jurisdiction_id: i64) -> String {
    format!("Tier{jurisdiction_id:03}")
}

pub fn cluster_network_stack_name(jurisdiction_id: i64) -> String {
    format!("ClusterNet{jurisdiction_id:04}")
}

pub fn cluster_nodes_stack_name(jurisdiction_id: i64) -> String {
    format!("ClusterNodes{jurisdiction_id:04}")
}

pub fn vpc_export_name(jurisdiction_id: i64, label: &str) -> String {
    format!("{jurisdiction_id}-vpc-{label}")
}

pub fn route_table_export_name(jurisdiction_id: i64, label: &str) -> String {
    format!("{jurisdiction_id}-rt-{label}")
}

pub fn subnet_export_name(jurisdiction_id: i64, index: usize) -> String {
    format!("{jurisdiction_id}-subnet-{index}")
}

pub fn security_group_export_name(jurisdiction_id: i64, role: &str) -> String {
    format!("{jurisdiction_id}-sg-{role}")
}

pub fn controller_elb_export_name(jurisdiction_id: i64) -> String {
    format!("{jurisdiction_id}-elb-controller")
}

pub fn etcd_elb_export_name(jurisdiction_id: i64) -> String {
    format!("{jurisdiction_id}-elb-etcd")
}

pub fn instance_export_name(jurisdiction_id: i64, role: &str, ip: &str) -> String {
    format!("{jurisdiction_id}-instance-{role}-{}", ip.replace('.', "-"))
}

/// Assigns one availability zone per subnet by round-robining over
/// `available_azs`, skipping [`EXCLUDED_AZ`]. `available_azs` is whatever
/// `ec2:DescribeAvailabilityZones` returned for the region (§4.5).
pub fn assign_azs(available_azs: &[String], subnet_count: usize) -> Result<Vec<String>, ProvisionerError> {
    let usable: Vec<&String> = available_azs.iter().filter(|az| az.as_str() != EXCLUDED_AZ).collect();
    if usable.is_empty() {
        return Err(ProvisionerError::PrecondFail(format!("no usable availability zones after excluding {EXCLUDED_AZ}")));
    }
    Ok((0..subnet_count).map(|i| usable[i % usable.len()].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_us_east_1c_from_round_robin() {
        let azs = vec!["us-east-1a".to_string(), "us-east-1b".to_string(), "us-east-1c".to_string()];
        let assigned = assign_azs(&azs, 4).unwrap();
        assert_eq!(assigned, vec!["us-east-1a", "us-east-1b", "us-east-1a", "us-east-1b"]);
    }

    #[test]
    fn rejects_when_every_az_is_excluded() {
        let azs = vec!["us-east-1c".to_string()];
        assert!(assign_azs(&azs, 2).is_err());
    }

    #[test]
    fn stack_names_match_the_deterministic_convention() {
        assert_eq!(control_group_stack_name(1), "ControlGroup01");
        assert_eq!(tier_stack_name(2), "Tier002");
        assert_eq!(cluster_network_stack_name(3), "ClusterNet0003");
        assert_eq!(cluster_nodes_stack_name(3), "ClusterNodes0003");
    }
}
