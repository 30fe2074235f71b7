use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::collections::HashMap;
use tracing::warn;

use super::{EvaluateFlagResponse, EvaluateRequest, EvaluateResponse};
use crate::error::ApiError;
use crate::evaluation::{evaluate, EvaluationContext, EvaluationReason};
use crate::state::AppState;

/// Evaluate one flag; query parameters form the caller context
/// (e.g. `?user_id=123&country=US`).
pub async fn evaluate_one(
    State(state): State<AppState>,
    Path(flag_name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let context = EvaluationContext::from_params(params);
    let definition = state.cache.get(&flag_name).await?;
    let result = evaluate(definition.as_ref(), &context)?;

    let status = match result.reason {
        EvaluationReason::FlagNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };

    Ok((
        status,
        Json(EvaluateFlagResponse {
            flag_name,
            value: result.value,
            reason: result.reason,
        }),
    ))
}

/// Evaluate every flag in the current snapshot for one caller context.
pub async fn evaluate_all(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let snapshot = state.cache.get_all().await?;

    let mut flags = HashMap::with_capacity(snapshot.flags().len());
    let mut errors = HashMap::new();

    for (name, definition) in snapshot.flags() {
        match evaluate(Some(definition), &request.context) {
            Ok(result) => {
                flags.insert(name.clone(), result);
            }
            Err(e) => {
                warn!(flag = %name, error = %e, "Skipping misconfigured flag in batch evaluation");
                errors.insert(name.clone(), e.to_string());
            }
        }
    }

    Ok(Json(EvaluateResponse { flags, errors }))
}
