//! In-memory [`Store`] used by orchestrator and handler tests. Honors the
//! same read-modify-write contract as [`super::postgres::PostgresStore`]
//! (merges are serialized behind a single mutex, which stands in for
//! Postgres row locking).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::models::{ConfigurationTemplate, Jurisdiction, JurisdictionEdits, JurisdictionType, NewJurisdiction, UserdataTemplate};
use super::{AssetsMerge, Store};
use crate::errors::StoreError;

#[derive(Default)]
struct Inner {
    jurisdiction_types: Vec<JurisdictionType>,
    configuration_templates: Vec<ConfigurationTemplate>,
    userdata_templates: Vec<UserdataTemplate>,
    jurisdictions: Vec<Jurisdiction>,
    next_jurisdiction_id: i64,
}

pub struct FakeStore {
    inner: Mutex<Inner>,
}

impl Default for FakeStore {
    fn default() -> Self {
        FakeStore {
            inner: Mutex::new(Inner {
                next_jurisdiction_id: 1,
                ..Default::default()
            }),
        }
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_jurisdiction_type(&self, jt: JurisdictionType) {
        self.inner.lock().unwrap().jurisdiction_types.push(jt);
    }

    pub fn seed_configuration_template(&self, ct: ConfigurationTemplate) {
        self.inner.lock().unwrap().configuration_templates.push(ct);
    }

    pub fn seed_userdata_template(&self, ut: UserdataTemplate) {
        self.inner.lock().unwrap().userdata_templates.push(ut);
    }

    /// Seeds a jurisdiction with a caller-chosen id, bypassing
    /// `create_jurisdiction`'s autoincrement and name-uniqueness check.
    /// Intended for test fixtures that need deterministic ids.
    pub fn seed_jurisdiction(&self, j: Jurisdiction) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_jurisdiction_id = inner.next_jurisdiction_id.max(j.id + 1);
        inner.jurisdictions.push(j);
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn list_jurisdiction_types(&self) -> Result<Vec<JurisdictionType>, StoreError> {
        Ok(self.inner.lock().unwrap().jurisdiction_types.clone())
    }

    async fn get_jurisdiction_type(&self, id: i64) -> Result<JurisdictionType, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .jurisdiction_types
            .iter()
            .find(|jt| jt.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "JurisdictionType", id })
    }

    async fn list_configuration_templates(&self) -> Result<Vec<ConfigurationTemplate>, StoreError> {
        Ok(self.inner.lock().unwrap().configuration_templates.clone())
    }

    async fn get_configuration_template(&self, id: i64) -> Result<ConfigurationTemplate, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .configuration_templates
            .iter()
            .find(|ct| ct.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "ConfigurationTemplate", id })
    }

    async fn get_userdata_template_by_name(&self, name: &str) -> Result<UserdataTemplate, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .userdata_templates
            .iter()
            .find(|ut| ut.name == name)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "UserdataTemplate", id: 0 })
    }

    async fn list_jurisdictions(&self) -> Result<Vec<Jurisdiction>, StoreError> {
        Ok(self.inner.lock().unwrap().jurisdictions.clone())
    }

    async fn get_jurisdiction(&self, id: i64) -> Result<Jurisdiction, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .jurisdictions
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "Jurisdiction", id })
    }

    async fn jurisdiction_name_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().jurisdictions.iter().any(|j| j.name == name))
    }

    async fn children(&self, parent_id: i64) -> Result<Vec<Jurisdiction>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .jurisdictions
            .iter()
            .filter(|j| j.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn create_jurisdiction(&self, new: NewJurisdiction) -> Result<Jurisdiction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.jurisdictions.iter().any(|j| j.name == new.name) {
            return Err(StoreError::NameCollision(new.name));
        }
        let id = inner.next_jurisdiction_id;
        inner.next_jurisdiction_id += 1;
        let jurisdiction = Jurisdiction {
            id,
            name: new.name,
            created_on: Utc::now(),
            active: false,
            configuration: new.configuration,
            assets: None,
            metadata: None,
            jurisdiction_type_id: new.jurisdiction_type_id,
            parent_id: new.parent_id,
        };
        inner.jurisdictions.push(jurisdiction.clone());
        Ok(jurisdiction)
    }

    async fn edit_jurisdiction(&self, id: i64, edits: JurisdictionEdits) -> Result<Jurisdiction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let j = inner
            .jurisdictions
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::NotFound { kind: "Jurisdiction", id })?;
        if let Some(name) = edits.name {
            j.name = name;
        }
        if let Some(metadata) = edits.metadata {
            j.metadata = Some(metadata as BTreeMap<_, _>);
        }
        if let Some(configuration) = edits.configuration {
            j.configuration = configuration;
        }
        Ok(j.clone())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let j = inner
            .jurisdictions
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::NotFound { kind: "Jurisdiction", id })?;
        j.active = active;
        Ok(())
    }

    async fn set_assets(&self, id: i64, assets: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let j = inner
            .jurisdictions
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::NotFound { kind: "Jurisdiction", id })?;
        j.assets = Some(assets);
        Ok(())
    }

    async fn merge_assets(&self, id: i64, merge: AssetsMerge) -> Result<Jurisdiction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let j = inner
            .jurisdictions
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::NotFound { kind: "Jurisdiction", id })?;
        let mut assets = j.assets.clone().unwrap_or_else(|| serde_json::json!({}));
        merge(&mut assets);
        j.assets = Some(assets);
        Ok(j.clone())
    }
}
