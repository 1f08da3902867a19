//! Userdata renderer (§4.3).
//!
//! Builds the interpolation context for a node role, fetches that role's
//! `tera` template from the store, renders it, and returns both the raw
//! rendered document (for upload to the object bucket) and the
//! gzip+base64-encoded form that is embedded as CloudFormation instance
//! userdata. `templates/{controller,worker,etcd}.tera` are the default
//! templates; `migrations/0002_seed_userdata_templates.sql` loads their
//! content into `userdata_template` rows so a cluster with no
//! `userdata_template_ids` of its own still resolves one by name.

use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use tera::{Context, Tera};

use crate::cloud::CloudAdapter;
use crate::errors::RenderError;
use crate::store::models::NodeRole;
use crate::store::Store;

pub struct RenderedUserdata {
    pub role: NodeRole,
    pub plaintext: String,
    pub compressed_base64: String,
}

/// KMS-wrapped, gzip-compressed, base64-encoded credential material handed
/// to the renderer for a given role (§4.2/§4.3: certs are produced by the
/// PKI generator, wrapped here).
pub struct WrappedCredentials {
    pub ca_cert: String,
    pub cert: String,
    pub key: String,
}

pub struct RenderContext<'a> {
    pub role: NodeRole,
    pub index: u32,
    pub region: &'a str,
    pub controller_elb_dns: &'a str,
    pub etcd_elb_dns: Option<&'a str>,
    pub credentials: &'a WrappedCredentials,
    pub merged_configuration: &'a Value,
}

/// Wraps a single certificate/key blob: KMS-encrypt, gzip, base64. Exposed
/// separately from [`render`] so callers can build a [`WrappedCredentials`]
/// once per role and reuse it.
pub async fn wrap_credential(cloud: &dyn CloudAdapter, kms_key_id: &str, plaintext: &[u8]) -> Result<String, RenderError> {
    let wrapped = cloud.kms_encrypt(kms_key_id, plaintext).await?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&wrapped).expect("in-memory gzip writer never fails");
    let compressed = encoder.finish().expect("in-memory gzip writer never fails");
    Ok(BASE64.encode(compressed))
}

fn build_context(ctx: &RenderContext<'_>) -> Result<Context, RenderError> {
    let mut tera_ctx = Context::new();
    tera_ctx.insert("index", &ctx.index);
    tera_ctx.insert("region", ctx.region);
    tera_ctx.insert("controller_elb_dns", ctx.controller_elb_dns);
    if let Some(etcd_dns) = ctx.etcd_elb_dns {
        tera_ctx.insert("etcd_elb_dns", etcd_dns);
    }
    tera_ctx.insert("ca_cert", &ctx.credentials.ca_cert);
    tera_ctx.insert("cert", &ctx.credentials.cert);
    tera_ctx.insert("key", &ctx.credentials.key);

    if let Value::Object(map) = ctx.merged_configuration {
        for (key, value) in map {
            tera_ctx.insert(key, value);
        }
    }

    Ok(tera_ctx)
}

/// Fetches the template for `render_ctx.role` from the store, renders it,
/// and returns both forms described above. `template_name` is the
/// `userdata_template.name` configured for this role in
/// `userdata_template_ids` (§6).
pub async fn render(
    store: &dyn Store,
    template_name: &str,
    render_ctx: RenderContext<'_>,
) -> Result<RenderedUserdata, RenderError> {
    let template = store.get_userdata_template_by_name(template_name).await?;
    if template.role != render_ctx.role {
        return Err(RenderError::TemplateNotFound(template_name.to_string()));
    }

    let tera_ctx = build_context(&render_ctx)?;
    let plaintext = Tera::one_off(&template.content, &tera_ctx, false)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plaintext.as_bytes()).expect("in-memory gzip writer never fails");
    let compressed = encoder.finish().expect("in-memory gzip writer never fails");
    let compressed_base64 = BASE64.encode(compressed);

    Ok(RenderedUserdata { role: render_ctx.role, plaintext, compressed_base64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fake::FakeStore;
    use crate::store::models::UserdataTemplate;
    use serde_json::json;

    #[tokio::test]
    async fn renders_role_template_with_merged_configuration() {
        let store = FakeStore::new();
        store.seed_userdata_template(UserdataTemplate {
            id: 1,
            name: "default_worker".to_string(),
            role: NodeRole::Worker,
            content: "region={{ region }} idx={{ index }} k8s={{ kubernetes_version }}".to_string(),
        });

        let creds = WrappedCredentials {
            ca_cert: "ca".to_string(),
            cert: "cert".to_string(),
            key: "key".to_string(),
        };
        let config = json!({"kubernetes_version": "1.31"});
        let ctx = RenderContext {
            role: NodeRole::Worker,
            index: 2,
            region: "us-east-1",
            controller_elb_dns: "controller-elb",
            etcd_elb_dns: None,
            credentials: &creds,
            merged_configuration: &config,
        };

        let rendered = render(&store, "default_worker", ctx).await.unwrap();
        assert_eq!(rendered.plaintext, "region=us-east-1 idx=2 k8s=1.31");
        assert!(!rendered.compressed_base64.is_empty());
    }

    #[tokio::test]
    async fn wrong_role_template_is_rejected() {
        let store = FakeStore::new();
        store.seed_userdata_template(UserdataTemplate {
            id: 1,
            name: "default_controller".to_string(),
            role: NodeRole::Controller,
            content: "x".to_string(),
        });

        let creds = WrappedCredentials { ca_cert: String::new(), cert: String::new(), key: String::new() };
        let config = json!({});
        let ctx = RenderContext {
            role: NodeRole::Worker,
            index: 0,
            region: "us-east-1",
            controller_elb_dns: "elb",
            etcd_elb_dns: None,
            credentials: &creds,
            merged_configuration: &config,
        };

        let result = render(&store, "default_controller", ctx).await;
        assert!(result.is_err());
    }
}
