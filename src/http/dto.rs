//! Wire types for the `/v1/` HTTP surface (§6).
//!
//! Every success response is wrapped as `{"data": ...}`. Errors map to a
//! plain 400 with a human message, except for defects that deserve a 5xx
//! (`ProvisionerError::is_client_fault`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::errors::{ProvisionerError, StoreError};

#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub data: T,
}

pub fn envelope<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { data })
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateJurisdictionRequest {
    pub name: String,
    pub type_id: i64,
    pub template_id: i64,
    pub parent_id: Option<i64>,
}

/// Only `name`, `metadata`, and `configuration` are editable (§6).
#[derive(Debug, Deserialize, Default)]
pub struct EditJurisdictionRequest {
    pub id: i64,
    pub name: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub configuration: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct JurisdictionIdRequest {
    pub id: i64,
}

pub struct ApiError(pub ProvisionerError);

impl From<ProvisionerError> for ApiError {
    fn from(err: ProvisionerError) -> Self {
        ApiError(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(ProvisionerError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_fault() { StatusCode::BAD_REQUEST } else { StatusCode::INTERNAL_SERVER_ERROR };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}
