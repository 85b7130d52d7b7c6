//! Read-only catalog introspection

use crate::models::SuccessResponse;
use crate::registry::{AppProfile, ModelProfile};
use crate::state::SharedState;
use axum::{extract::State, Json};

pub async fn list_models(State(state): State<SharedState>) -> Json<SuccessResponse<Vec<ModelProfile>>> {
    let models: Vec<ModelProfile> = state.registry.models().into_iter().cloned().collect();
    Json(SuccessResponse::with_data(
        format!("{} models available.", models.len()),
        models,
    ))
}

pub async fn list_limits(State(state): State<SharedState>) -> Json<SuccessResponse<Vec<AppProfile>>> {
    let apps: Vec<AppProfile> = state.registry.apps().into_iter().cloned().collect();
    Json(SuccessResponse::with_data(
        format!("{} applications configured.", apps.len()),
        apps,
    ))
}
