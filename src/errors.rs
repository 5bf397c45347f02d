use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::approval::ApprovalStatus;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("approval request {0} not found")]
    NotFound(Uuid),

    /// The request was already resolved — by another decider, a cancel, or
    /// the timeout sweep.
    #[error("approval request {id} already {current:?}")]
    Conflict { id: Uuid, current: ApprovalStatus },

    #[error("validation failed: {0}")]
    Validation(String),

    /// The caller's own wait window elapsed. Distinct from the request
    /// reaching its `TimedOut` terminal state, which is an outcome.
    #[error("wait for decision timed out")]
    WaitTimeout,

    #[error("approval store unavailable")]
    StorageUnavailable,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(id),
            StoreError::Unavailable => AppError::StorageUnavailable,
            StoreError::DuplicateId(id) => {
                AppError::Internal(anyhow::anyhow!("duplicate approval id {id}"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "request_not_found",
                self.to_string(),
            ),
            AppError::Conflict { current, .. } => (
                StatusCode::CONFLICT,
                "conflict_error",
                "already_resolved",
                format!("request already resolved: {}", current.as_str()),
            ),
            AppError::Validation(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "validation_failed",
                reason.clone(),
            ),
            AppError::WaitTimeout => (
                StatusCode::REQUEST_TIMEOUT,
                "timeout_error",
                "wait_timeout",
                "wait for decision timed out".to_string(),
            ),
            AppError::StorageUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_error",
                "storage_unavailable",
                "approval store unavailable".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
