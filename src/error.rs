use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::admin::AdminError;
use crate::cache::CacheError;
use crate::evaluation::EvaluationError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized: Invalid API Key")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Admin(e) => match e {
                AdminError::NotFound(_) => StatusCode::NOT_FOUND,
                AdminError::AlreadyExists(_) => StatusCode::CONFLICT,
                AdminError::Invalid(_) => StatusCode::BAD_REQUEST,
                AdminError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Evaluation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
