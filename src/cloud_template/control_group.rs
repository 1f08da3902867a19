//! Control-group template (§4.4): one private object bucket.

use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

/// `control-group-alpha-bucket-<8 lowercase letters>`.
pub fn bucket_name() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .map(char::from)
        .filter(char::is_ascii_lowercase)
        .take(8)
        .collect();
    format!("control-group-alpha-bucket-{suffix}")
}

pub fn build(jurisdiction_name: &str, bucket_name: &str) -> Value {
    json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": format!("Control group bucket for {jurisdiction_name}"),
        "Resources": {
            "ControlGroupBucket": {
                "Type": "AWS::S3::Bucket",
                "Properties": {
                    "BucketName": bucket_name,
                    "AccessControl": "Private",
                    "Tags": [{"Key": "Name", "Value": jurisdiction_name}],
                },
                "DeletionPolicy": "Delete",
            },
        },
        "Outputs": {
            "BucketName": {
                "Value": {"Ref": "ControlGroupBucket"},
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_name_has_the_expected_shape() {
        let name = bucket_name();
        assert!(name.starts_with("control-group-alpha-bucket-"));
        let suffix = name.strip_prefix("control-group-alpha-bucket-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }
}
