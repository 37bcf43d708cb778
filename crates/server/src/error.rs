//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`. Error bodies are JSON `{"error": "..."}`, the
//! shape the dashboard reads from failed mutations.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::auth::AuthError;
use crate::services::workflow::WorkflowError;
use crate::store::StoreError;

/// Application-level error type for the meal workflow service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input (unknown enum value, unresolvable reference).
    #[error("Validation: {0}")]
    Validation(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The actor's role or identity does not permit the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The entity is not in a state that permits the action.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A concurrent update won the version race.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(msg) => Self::Validation(msg),
            WorkflowError::Forbidden(msg) => Self::Forbidden(msg),
            WorkflowError::NotFound => Self::NotFound("delivery not found".to_string()),
            WorkflowError::PreconditionFailed(msg) => Self::PreconditionFailed(msg),
            WorkflowError::Conflict => {
                Self::Conflict("delivery was updated concurrently".to_string())
            }
            WorkflowError::Store(err) => Self::Store(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Store(_) | Self::Internal(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PreconditionFailed(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::RoleMismatch => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                AuthError::Store(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::RoleMismatch => {
                    "Invalid credentials".to_string()
                }
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::Store(_) | AuthError::PasswordHash => {
                    "Internal server error".to_string()
                }
            },
            Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::PreconditionFailed(msg)
            | Self::Conflict(msg) => msg.clone(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("delivery 17".to_string());
        assert_eq!(err.to_string(), "Not found: delivery 17");

        let err = AppError::Validation("unknown meal type".to_string());
        assert_eq!(err.to_string(), "Validation: unknown meal type");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::Validation("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Unauthorized("x".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("x".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::PreconditionFailed("x".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Conflict("x".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Internal("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_workflow_error_mapping() {
        assert_eq!(
            get_status(WorkflowError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(WorkflowError::Conflict.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(WorkflowError::Forbidden("nope".to_string()).into()),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(
            get_status(AppError::Auth(AuthError::InvalidCredentials)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Auth(AuthError::RoleMismatch)),
            StatusCode::UNAUTHORIZED
        );
    }
}
