//! Router assembly for the `/v1/` surface (§6).

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::orchestrator::EngineContext;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: EngineContext,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/get_jurisdiction_types/", get(handlers::get_jurisdiction_types))
        .route("/v1/get_configuration_templates/", get(handlers::get_configuration_templates))
        .route("/v1/get_jurisdictions/", get(handlers::get_jurisdictions))
        .route("/v1/create_jurisdiction/", post(handlers::create_jurisdiction))
        .route("/v1/edit_jurisdiction/", put(handlers::edit_jurisdiction))
        .route("/v1/provision_jurisdiction/", put(handlers::provision_jurisdiction))
        .route("/v1/decommission_jurisdiction/", put(handlers::decommission_jurisdiction))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
