//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use corkboard_core::calendar::CalendarError;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::BadGateway(m) => (StatusCode::BAD_GATEWAY, "upstream_error", m.as_str()),
            AppError::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<CalendarError> for AppError {
    fn from(e: CalendarError) -> Self {
        let message = e.to_string();
        match e {
            CalendarError::BoardNotFound => AppError::NotFound(message),
            CalendarError::InvalidRange(_) => AppError::Validation(message),
            CalendarError::NotConfigured | CalendarError::SyncInProgress(_) => {
                AppError::Conflict(message)
            }
            CalendarError::TokenRefreshFailed(_)
            | CalendarError::Provider(_)
            | CalendarError::OAuth(_) => AppError::BadGateway(message),
            CalendarError::Persistence(_) | CalendarError::Encryption(_) => {
                AppError::Internal(message)
            }
        }
    }
}
