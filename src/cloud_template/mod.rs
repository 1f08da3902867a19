//! Cloud template builder (§4.4): four CloudFormation shapes rendered as
//! plain `serde_json` trees, the way `other_examples` generates stack
//! bodies without a typed CFN DSL crate — none is carried in the
//! dependency stack.

pub mod builder;
pub mod cluster_network;
pub mod cluster_nodes;
pub mod control_group;
pub mod tier;

pub use builder::{cluster_network_stack_name, cluster_nodes_stack_name, control_group_stack_name, tier_stack_name};
