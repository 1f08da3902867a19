//! The cloud adapter (§4.5): a thin, object-safe contract over the AWS
//! SDK. Tests drive [`fake::FakeCloudAdapter`], which honors the same
//! status taxonomy as [`aws::AwsCloudAdapter`] (§9: "the cloud adapter
//! must be an interface; tests drive a fake").

pub mod aws;
pub mod fake;
pub mod status;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::CloudError;

#[derive(Debug, Clone)]
pub struct StackExport {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct LoadBalancerDescription {
    pub name: String,
    pub dns_name: String,
}

#[async_trait]
pub trait CloudAdapter: Send + Sync {
    async fn submit_stack(&self, name: &str, template_body: &Value, capabilities: &[&str]) -> Result<String, CloudError>;
    async fn describe_stack(&self, stack_id: &str) -> Result<String, CloudError>;
    async fn delete_stack(&self, stack_id: &str) -> Result<(), CloudError>;
    /// Paginated through `NextToken` until exhaustion; returns every export
    /// currently published by any live stack.
    async fn list_exports(&self) -> Result<Vec<StackExport>, CloudError>;

    async fn create_bucket(&self, name: &str, region: &str) -> Result<(), CloudError>;
    async fn delete_bucket(&self, name: &str) -> Result<(), CloudError>;
    async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), CloudError>;
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, CloudError>;
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), CloudError>;

    async fn create_key_pair(&self, name: &str) -> Result<String, CloudError>;
    async fn delete_key_pair(&self, name: &str) -> Result<(), CloudError>;

    async fn kms_create_key(&self, description: &str) -> Result<String, CloudError>;
    async fn kms_create_alias(&self, alias: &str, key_id: &str) -> Result<(), CloudError>;
    async fn kms_delete_alias(&self, alias: &str) -> Result<(), CloudError>;
    async fn kms_schedule_key_deletion(&self, key_id: &str) -> Result<(), CloudError>;
    async fn kms_encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, CloudError>;

    /// Filters by the `{Name: tag_value}` tag pair the network monitor uses
    /// to find "this cluster's" controller/etcd ELB.
    async fn elb_describe_load_balancers_by_tag(&self, tag_value: &str) -> Result<Vec<LoadBalancerDescription>, CloudError>;
    async fn elb_register_instances(&self, load_balancer_name: &str, instance_ids: &[String]) -> Result<(), CloudError>;

    async fn ec2_describe_availability_zones(&self, region: &str) -> Result<Vec<String>, CloudError>;
}
