//! Crate-wide error types.
//!
//! Mirrors the layered approach of most provisioning engines: narrow,
//! module-owned error enums (`StoreError`, `ConfigResolverError`,
//! `PkiError`, `RenderError`, `CloudError`, `QueueError`) convert into the
//! single `ProvisionerError` that the HTTP surface and the worker loop
//! actually match on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} with id {id} does not exist")]
    NotFound { kind: &'static str, id: i64 },
    #[error("jurisdiction '{0}' already exists")]
    NameCollision(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigResolverError {
    #[error("jurisdiction {0} is missing a required ancestor link")]
    MissingAncestor(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum PkiError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("certificate signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Cloud(#[from] CloudError),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("userdata template '{0}' not found")]
    TemplateNotFound(String),
    #[error("template render failed: {0}")]
    Render(#[from] tera::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cloud(#[from] CloudError),
}

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("aws sdk error: {0}")]
    Sdk(String),
    #[error("required cloudformation export '{0}' was never observed")]
    MissingExport(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("amqp error: {0}")]
    Amqp(String),
    #[error("failed to encode job payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The error surface returned by orchestrator operations and HTTP handlers.
#[derive(Error, Debug)]
pub enum ProvisionerError {
    #[error("{kind} with id {id} does not exist")]
    NotFound { kind: &'static str, id: i64 },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PrecondFail(String),
    #[error("Platform {0} not supported")]
    Unsupported(String),
    #[error("PKI generation failed: {0}")]
    Pki(#[from] PkiError),
    #[error("userdata render failed: {0}")]
    Render(#[from] RenderError),
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),
    #[error("monitor exhausted its polling budget")]
    Timeout,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("configuration resolution failed: {0}")]
    ConfigResolver(#[from] ConfigResolverError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ProvisionerError {
    /// Whether this error should be surfaced to an HTTP caller as 400, vs.
    /// an unexpected-defect 5xx. Everything the orchestrator can return in
    /// the synchronous prologue is a "bad request" in the sense of §7.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, ProvisionerError::Store(StoreError::Database(_)))
    }
}
