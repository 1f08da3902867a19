//! Real [`CloudAdapter`] backed by the AWS SDK.

use async_trait::async_trait;
use aws_sdk_ec2::types::Filter as Ec2Filter;
use aws_sdk_elasticloadbalancing::types::Tag as ElbTag;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use serde_json::Value;
use tracing::{instrument, warn};

use super::{CloudAdapter, LoadBalancerDescription, StackExport};
use crate::errors::CloudError;

pub struct AwsCloudAdapter {
    cloudformation: aws_sdk_cloudformation::Client,
    s3: aws_sdk_s3::Client,
    kms: aws_sdk_kms::Client,
    ec2: aws_sdk_ec2::Client,
    elb: aws_sdk_elasticloadbalancing::Client,
}

impl AwsCloudAdapter {
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        AwsCloudAdapter {
            cloudformation: aws_sdk_cloudformation::Client::new(&config),
            s3: aws_sdk_s3::Client::new(&config),
            kms: aws_sdk_kms::Client::new(&config),
            ec2: aws_sdk_ec2::Client::new(&config),
            elb: aws_sdk_elasticloadbalancing::Client::new(&config),
        }
    }
}

fn sdk_err(err: impl std::fmt::Display) -> CloudError {
    CloudError::Sdk(err.to_string())
}

#[async_trait]
impl CloudAdapter for AwsCloudAdapter {
    #[instrument(skip(self, template_body))]
    async fn submit_stack(&self, name: &str, template_body: &Value, capabilities: &[&str]) -> Result<String, CloudError> {
        let capabilities: Vec<aws_sdk_cloudformation::types::Capability> =
            capabilities.iter().map(|c| aws_sdk_cloudformation::types::Capability::from(*c)).collect();
        let output = self
            .cloudformation
            .create_stack()
            .stack_name(name)
            .template_body(template_body.to_string())
            .set_capabilities(Some(capabilities))
            .send()
            .await
            .map_err(sdk_err)?;
        output.stack_id().map(str::to_owned).ok_or_else(|| CloudError::Sdk("create_stack returned no stack id".to_string()))
    }

    async fn describe_stack(&self, stack_id: &str) -> Result<String, CloudError> {
        let output = self.cloudformation.describe_stacks().stack_name(stack_id).send().await.map_err(sdk_err)?;
        let stack = output.stacks().first().ok_or_else(|| CloudError::Sdk(format!("stack {stack_id} not found")))?;
        stack
            .stack_status()
            .map(|status| status.as_str().to_string())
            .ok_or_else(|| CloudError::Sdk(format!("stack {stack_id} has no status")))
    }

    async fn delete_stack(&self, stack_id: &str) -> Result<(), CloudError> {
        self.cloudformation.delete_stack().stack_name(stack_id).send().await.map_err(sdk_err)?;
        Ok(())
    }

    async fn list_exports(&self) -> Result<Vec<StackExport>, CloudError> {
        let mut exports = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut request = self.cloudformation.list_exports();
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }
            let output = request.send().await.map_err(sdk_err)?;
            for export in output.exports() {
                if let (Some(name), Some(value)) = (export.name(), export.value()) {
                    exports.push(StackExport { name: name.to_string(), value: value.to_string() });
                }
            }
            next_token = output.next_token().map(str::to_owned);
            if next_token.is_none() {
                break;
            }
        }
        Ok(exports)
    }

    async fn create_bucket(&self, name: &str, region: &str) -> Result<(), CloudError> {
        let mut request = self.s3.create_bucket().bucket(name);
        if region != "us-east-1" {
            let constraint = aws_sdk_s3::types::BucketLocationConstraint::from(region);
            request = request.create_bucket_configuration(
                aws_sdk_s3::types::CreateBucketConfiguration::builder().location_constraint(constraint).build(),
            );
        }
        request.send().await.map_err(sdk_err)?;
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), CloudError> {
        self.s3.delete_bucket().bucket(name).send().await.map_err(sdk_err)?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), CloudError> {
        self.s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map_err(sdk_err)?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, CloudError> {
        let output = self.s3.list_objects_v2().bucket(bucket).prefix(prefix).send().await.map_err(sdk_err)?;
        Ok(output.contents().iter().filter_map(|obj| obj.key()).map(str::to_owned).collect())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), CloudError> {
        if keys.is_empty() {
            return Ok(());
        }
        let identifiers: Vec<ObjectIdentifier> =
            keys.iter().filter_map(|k| ObjectIdentifier::builder().key(k).build().ok()).collect();
        let delete = Delete::builder().set_objects(Some(identifiers)).build().map_err(sdk_err)?;
        self.s3.delete_objects().bucket(bucket).delete(delete).send().await.map_err(sdk_err)?;
        Ok(())
    }

    async fn create_key_pair(&self, name: &str) -> Result<String, CloudError> {
        let output = self.ec2.create_key_pair().key_name(name).send().await.map_err(sdk_err)?;
        output
            .key_material()
            .map(str::to_owned)
            .ok_or_else(|| CloudError::Sdk("create_key_pair returned no key material".to_string()))
    }

    async fn delete_key_pair(&self, name: &str) -> Result<(), CloudError> {
        self.ec2.delete_key_pair().key_name(name).send().await.map_err(sdk_err)?;
        Ok(())
    }

    async fn kms_create_key(&self, description: &str) -> Result<String, CloudError> {
        let output = self.kms.create_key().description(description).send().await.map_err(sdk_err)?;
        output
            .key_metadata()
            .and_then(|metadata| metadata.key_id())
            .map(str::to_owned)
            .ok_or_else(|| CloudError::Sdk("create_key returned no key id".to_string()))
    }

    async fn kms_create_alias(&self, alias: &str, key_id: &str) -> Result<(), CloudError> {
        self.kms.create_alias().alias_name(alias).target_key_id(key_id).send().await.map_err(sdk_err)?;
        Ok(())
    }

    async fn kms_delete_alias(&self, alias: &str) -> Result<(), CloudError> {
        self.kms.delete_alias().alias_name(alias).send().await.map_err(sdk_err)?;
        Ok(())
    }

    async fn kms_schedule_key_deletion(&self, key_id: &str) -> Result<(), CloudError> {
        self.kms.schedule_key_deletion().key_id(key_id).send().await.map_err(sdk_err)?;
        Ok(())
    }

    async fn kms_encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, CloudError> {
        let output = self.kms.encrypt().key_id(key_id).plaintext(Blob::new(plaintext.to_vec())).send().await.map_err(sdk_err)?;
        output
            .ciphertext_blob()
            .map(|blob| blob.clone().into_inner())
            .ok_or_else(|| CloudError::Sdk("encrypt returned no ciphertext".to_string()))
    }

    async fn elb_describe_load_balancers_by_tag(&self, tag_value: &str) -> Result<Vec<LoadBalancerDescription>, CloudError> {
        let load_balancers = self.elb.describe_load_balancers().send().await.map_err(sdk_err)?;
        let names: Vec<String> = load_balancers
            .load_balancer_descriptions()
            .iter()
            .filter_map(|lb| lb.load_balancer_name().map(str::to_owned))
            .collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let tags = self
            .elb
            .describe_tags()
            .set_load_balancer_names(Some(names))
            .send()
            .await
            .map_err(sdk_err)?;

        let mut matched = Vec::new();
        for description in tags.tag_descriptions() {
            let has_tag = description.tags().iter().any(|tag: &ElbTag| tag.key() == Some("Name") && tag.value() == Some(tag_value));
            if !has_tag {
                continue;
            }
            let Some(name) = description.load_balancer_name() else { continue };
            let dns_name = load_balancers
                .load_balancer_descriptions()
                .iter()
                .find(|lb| lb.load_balancer_name() == Some(name))
                .and_then(|lb| lb.dns_name())
                .map(str::to_owned);
            if let Some(dns_name) = dns_name {
                matched.push(LoadBalancerDescription { name: name.to_string(), dns_name });
            } else {
                warn!(load_balancer = name, "matched ELB tag but DNS name was absent");
            }
        }
        Ok(matched)
    }

    async fn elb_register_instances(&self, load_balancer_name: &str, instance_ids: &[String]) -> Result<(), CloudError> {
        let instances: Vec<aws_sdk_elasticloadbalancing::types::Instance> =
            instance_ids.iter().map(|id| aws_sdk_elasticloadbalancing::types::Instance::builder().instance_id(id).build()).collect();
        self.elb
            .register_instances_with_load_balancer()
            .load_balancer_name(load_balancer_name)
            .set_instances(Some(instances))
            .send()
            .await
            .map_err(sdk_err)?;
        Ok(())
    }

    async fn ec2_describe_availability_zones(&self, region: &str) -> Result<Vec<String>, CloudError> {
        let output = self
            .ec2
            .describe_availability_zones()
            .filters(Ec2Filter::builder().name("region-name").values(region).build())
            .send()
            .await
            .map_err(sdk_err)?;
        Ok(output.availability_zones().iter().filter_map(|az| az.zone_name()).map(str::to_owned).collect())
    }
}
