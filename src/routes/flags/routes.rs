use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::{CreateFlagRequest, UpdateFlagRequest};
use crate::error::ApiError;
use crate::flags::FlagDefinition;
use crate::state::AppState;

/// Create a new feature flag
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateFlagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flag = state.admin.create(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(flag)))
}

/// List every flag in the current cache snapshot
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<FlagDefinition>>, ApiError> {
    let snapshot = state.cache.get_all().await?;

    let mut flags: Vec<FlagDefinition> = snapshot.flags().values().cloned().collect();
    flags.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(flags))
}

/// Get a single flag by name
pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FlagDefinition>, ApiError> {
    match state.cache.get(&name).await? {
        Some(flag) => Ok(Json(flag)),
        None => Err(ApiError::NotFound(format!("Flag '{}' not found", name))),
    }
}

/// Partially update a flag; omitted fields keep their stored values
pub async fn update(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<UpdateFlagRequest>,
) -> Result<Json<FlagDefinition>, ApiError> {
    let flag = state.admin.update(&name, payload).await?;
    Ok(Json(flag))
}

/// Delete a feature flag
pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.admin.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Toggle a flag's enabled state
pub async fn toggle(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FlagDefinition>, ApiError> {
    let flag = state.admin.toggle(&name).await?;
    Ok(Json(flag))
}
