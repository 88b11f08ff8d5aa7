use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Rejections raised before anything reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("account cannot be empty")]
    EmptyAccount,

    #[error("name must be at most 100 characters")]
    NameTooLong,

    #[error("account must be at most 100 characters")]
    AccountTooLong,

    #[error("password cannot be empty")]
    EmptyPassword,

    #[error("invalid user type '{0}'")]
    InvalidUserType(String),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("account '{0}' is already taken")]
    DuplicateAccount(String),

    #[error("user {0} not found")]
    NotFound(i64),

    /// Storage unreachable or timed out; safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid credentials")]
    InvalidCredentials,
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl DirectoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::Unavailable(_))
    }
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            DirectoryError::Validation(e) => {
                (StatusCode::BAD_REQUEST, "validation_error", e.to_string())
            }
            DirectoryError::DuplicateAccount(_) => {
                (StatusCode::CONFLICT, "duplicate_account", self.to_string())
            }
            DirectoryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            DirectoryError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid account or password".to_string(),
            ),
            DirectoryError::Unavailable(msg) => {
                tracing::error!(error = %msg, "storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "Service temporarily unavailable, try again".to_string(),
                )
            }
            DirectoryError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (
            status,
            Json(json!({
                "error": {
                    "type": error_type,
                    "message": message
                }
            })),
        )
            .into_response()
    }
}
