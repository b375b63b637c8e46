use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use optimizer_service::{OptimizerError, RegistryError};
use serde_json::json;
use thiserror::Error;

/// Request-scoped failures. Each maps to an HTTP status with a
/// `{"status": "error", "message": ...}` body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unable to load ports or plants data: {0}")]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Registry(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Optimizer(OptimizerError::Registry(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Optimizer(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("background computation failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        (
            status,
            Json(json!({
                "status": "error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
