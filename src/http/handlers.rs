//! Handler functions for the `/v1/` surface (§6). Each returns
//! `Result<_, ApiError>` so `?` maps every internal error straight onto the
//! 400/5xx split in [`ProvisionerError::is_client_fault`].

use axum::extract::{Query, State};
use axum::Json;

use super::dto::{envelope, ApiError, CreateJurisdictionRequest, EditJurisdictionRequest, Envelope, IdQuery, JurisdictionIdRequest};
use super::server::AppState;
use crate::errors::ProvisionerError;
use crate::store::models::{JurisdictionEdits, NewJurisdiction};
use crate::store::Store;

pub async fn get_jurisdiction_types(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let attrs = match query.id {
        Some(id) => vec![state.store.get_jurisdiction_type(id).await?.to_attributes()],
        None => state.store.list_jurisdiction_types().await?.iter().map(|jt| jt.to_attributes()).collect(),
    };
    Ok(envelope(serde_json::Value::Array(attrs)))
}

pub async fn get_configuration_templates(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let attrs = match query.id {
        Some(id) => vec![state.store.get_configuration_template(id).await?.to_attributes()],
        None => state.store.list_configuration_templates().await?.iter().map(|ct| ct.to_attributes()).collect(),
    };
    Ok(envelope(serde_json::Value::Array(attrs)))
}

pub async fn get_jurisdictions(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let attrs = match query.id {
        Some(id) => vec![state.store.get_jurisdiction(id).await?.to_attributes()],
        None => state.store.list_jurisdictions().await?.iter().map(|j| j.to_attributes()).collect(),
    };
    Ok(envelope(serde_json::Value::Array(attrs)))
}

pub async fn create_jurisdiction(
    State(state): State<AppState>,
    Json(request): Json<CreateJurisdictionRequest>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let jurisdiction_type = state.store.get_jurisdiction_type(request.type_id).await?;

    if let Some(parent_id) = request.parent_id {
        let parent = state.store.get_jurisdiction(parent_id).await?;
        if jurisdiction_type.parent_id != Some(parent.jurisdiction_type_id) {
            return Err(ProvisionerError::PrecondFail(format!(
                "jurisdiction type '{}' cannot be a child of type {}",
                jurisdiction_type.name, parent.jurisdiction_type_id
            ))
            .into());
        }
    } else if jurisdiction_type.parent_id.is_some() {
        return Err(ProvisionerError::PrecondFail(format!("jurisdiction type '{}' requires a parent", jurisdiction_type.name)).into());
    }

    let template = state.store.get_configuration_template(request.template_id).await?;
    if template.jurisdiction_type_id != request.type_id {
        return Err(ProvisionerError::PrecondFail("configuration template does not match jurisdiction type".to_string()).into());
    }

    if state.store.jurisdiction_name_exists(&request.name).await? {
        return Err(ProvisionerError::Conflict(format!("jurisdiction '{}' already exists", request.name)).into());
    }

    let created = state
        .store
        .create_jurisdiction(NewJurisdiction {
            name: request.name,
            jurisdiction_type_id: request.type_id,
            configuration: template.configuration,
            parent_id: request.parent_id,
        })
        .await?;

    Ok(envelope(created.to_attributes()))
}

pub async fn edit_jurisdiction(
    State(state): State<AppState>,
    Json(request): Json<EditJurisdictionRequest>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let jurisdiction = state.store.get_jurisdiction(request.id).await?;
    if jurisdiction.active {
        return Err(ProvisionerError::Conflict(format!("jurisdiction {} is active and cannot be edited", request.id)).into());
    }

    let edited = state
        .store
        .edit_jurisdiction(
            request.id,
            JurisdictionEdits { name: request.name, metadata: request.metadata, configuration: request.configuration },
        )
        .await?;

    Ok(envelope(edited.to_attributes()))
}

pub async fn provision_jurisdiction(
    State(state): State<AppState>,
    Json(request): Json<JurisdictionIdRequest>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let jurisdiction = crate::orchestrator::provision(&state.engine, request.id).await?;
    Ok(envelope(jurisdiction.to_attributes()))
}

pub async fn decommission_jurisdiction(
    State(state): State<AppState>,
    Json(request): Json<JurisdictionIdRequest>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let jurisdiction = crate::orchestrator::decommission(&state.engine, request.id).await?;
    Ok(envelope(jurisdiction.to_attributes()))
}
