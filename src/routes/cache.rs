use axum::{extract::State, http::StatusCode, Json};

use crate::cache::CacheStatus;
use crate::state::AppState;

pub async fn status(State(state): State<AppState>) -> Json<CacheStatus> {
    Json(state.cache.status())
}

/// Forces the next read to reload every definition from the store.
pub async fn invalidate(State(state): State<AppState>) -> StatusCode {
    state.cache.invalidate();
    StatusCode::NO_CONTENT
}
