use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";

/// Guards write routes: the `X-API-Key` header must match the configured admin key.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| key == &*state.api_key);

    if !authorized {
        warn!(method = %req.method(), uri = %req.uri(), "Rejected write without valid API key");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}
