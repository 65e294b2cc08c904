use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use forum_crypto::CryptoError;

/// Every failure the core can report to a caller.
///
/// Store and internal failures keep their detail for the log only; the
/// client sees a generic message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid email/username or password")]
    InvalidCredentials,

    #[error("Session not found or expired")]
    SessionNotFound,

    #[error("Too Many Requests")]
    TooManyRequests,

    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::SessionNotFound | Self::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(_) | Self::Internal(_) => {
                error!("{}", self);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
