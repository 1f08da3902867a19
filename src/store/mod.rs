//! The durable state store (§3). The store is the single source of truth;
//! the cloud and the task queue are derived from it (§2).
//!
//! [`Store`] is a plain trait rather than a concrete `sqlx` type so that the
//! orchestrator can be exercised against [`fake::FakeStore`] in tests
//! without a database, the same "interface + fake" split §9 mandates for
//! the cloud adapter.

pub mod fake;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::StoreError;
use models::{ConfigurationTemplate, Jurisdiction, JurisdictionEdits, JurisdictionType, NewJurisdiction, UserdataTemplate};

/// A closure applied to a jurisdiction's `assets` JSON document under a
/// read-modify-write transaction (§5: "open tx -> read -> close; cloud
/// work; open tx -> merge result -> close").
pub type AssetsMerge = Box<dyn FnOnce(&mut Value) + Send>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_jurisdiction_types(&self) -> Result<Vec<JurisdictionType>, StoreError>;
    async fn get_jurisdiction_type(&self, id: i64) -> Result<JurisdictionType, StoreError>;

    async fn list_configuration_templates(&self) -> Result<Vec<ConfigurationTemplate>, StoreError>;
    async fn get_configuration_template(&self, id: i64) -> Result<ConfigurationTemplate, StoreError>;

    async fn get_userdata_template_by_name(&self, name: &str) -> Result<UserdataTemplate, StoreError>;

    async fn list_jurisdictions(&self) -> Result<Vec<Jurisdiction>, StoreError>;
    async fn get_jurisdiction(&self, id: i64) -> Result<Jurisdiction, StoreError>;
    async fn jurisdiction_name_exists(&self, name: &str) -> Result<bool, StoreError>;
    async fn children(&self, parent_id: i64) -> Result<Vec<Jurisdiction>, StoreError>;

    async fn create_jurisdiction(&self, new: NewJurisdiction) -> Result<Jurisdiction, StoreError>;
    async fn edit_jurisdiction(&self, id: i64, edits: JurisdictionEdits) -> Result<Jurisdiction, StoreError>;

    /// Sets `active` unconditionally. Used by the synchronous decommission
    /// prologue (eager `active=false`) and by monitors on terminal success.
    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError>;

    /// Replaces `assets` wholesale. Used by the synchronous provision
    /// prologue, which is the sole writer until a monitor takes over.
    async fn set_assets(&self, id: i64, assets: Value) -> Result<(), StoreError>;

    /// Re-reads `assets` inside a transaction, applies `merge`, and writes
    /// the result back. This is the only way monitors are allowed to touch
    /// `assets`, so concurrent monitors never clobber each other's keys.
    async fn merge_assets(&self, id: i64, merge: AssetsMerge) -> Result<Jurisdiction, StoreError>;
}

/// Walks the direct parent chain for a jurisdiction, nearest ancestor
/// first. Never follows any relationship other than `parent_id` (§9 open
/// question (a): no `parent_jurisdiction`/`parent.name` alias).
pub async fn ancestors(store: &dyn Store, jurisdiction: &Jurisdiction) -> Result<Vec<Jurisdiction>, StoreError> {
    let mut chain = Vec::new();
    let mut next = jurisdiction.parent_id;
    while let Some(id) = next {
        let parent = store.get_jurisdiction(id).await?;
        next = parent.parent_id;
        chain.push(parent);
    }
    Ok(chain)
}
