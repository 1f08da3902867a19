use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

/// The three jurisdiction types the orchestrator knows how to provision.
/// The schema itself is a generic type tree (§3), but every operation in
/// §4.6 switches on one of these three names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionKind {
    ControlGroup,
    Tier,
    Cluster,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JurisdictionType {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub parent_id: Option<i64>,
}

impl JurisdictionType {
    pub fn kind(&self) -> Option<JurisdictionKind> {
        self.name.parse().ok()
    }

    pub fn to_attributes(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "parent_id": self.parent_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationTemplate {
    pub id: i64,
    pub name: String,
    pub configuration: Value,
    pub default: bool,
    pub jurisdiction_type_id: i64,
}

impl ConfigurationTemplate {
    pub fn to_attributes(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "configuration": self.configuration,
            "default": self.default,
            "jurisdiction_type_id": self.jurisdiction_type_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Controller,
    Worker,
    Etcd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserdataTemplate {
    pub id: i64,
    pub name: String,
    pub role: NodeRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub id: i64,
    pub name: String,
    pub created_on: DateTime<Utc>,
    pub active: bool,
    pub configuration: Value,
    pub assets: Option<Value>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub jurisdiction_type_id: i64,
    pub parent_id: Option<i64>,
}

impl Jurisdiction {
    /// Wire/log projection. `metadata` is renamed from the store's
    /// `jurisdiction_metadata` column back to its public name here (§6).
    pub fn to_attributes(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "created_on": self.created_on,
            "active": self.active,
            "assets": self.assets,
            "configuration": self.configuration,
            "metadata": self.metadata,
            "jurisdiction_type_id": self.jurisdiction_type_id,
            "parent_id": self.parent_id,
        })
    }

    pub fn assets_or_empty(&self) -> Value {
        self.assets.clone().unwrap_or_else(|| serde_json::json!({}))
    }
}

#[derive(Debug, Clone)]
pub struct NewJurisdiction {
    pub name: String,
    pub jurisdiction_type_id: i64,
    pub configuration: Value,
    pub parent_id: Option<i64>,
}

/// Only these keys may be mutated through `PUT /edit_jurisdiction/` (§6).
#[derive(Debug, Clone, Default)]
pub struct JurisdictionEdits {
    pub name: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub configuration: Option<Value>,
}
