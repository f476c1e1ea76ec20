use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Fixture store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    DuplicateId { kind: &'static str, id: String },
}

/// Errors surfaced to HTTP callers as `{ "detail": ... }` bodies
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    InvalidTransition {
        message: String,
        current_state: String,
        allowed_transitions: Vec<String>,
    },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Typed REST client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API error: {status} - {detail}")]
    Api { status: u16, detail: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// Shorthand for a 400 with a message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }

    /// Shorthand for a 404 naming the missing entity.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        ApiError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } | ApiError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => ApiError::NotFound {
                kind: kind.to_string(),
                id,
            },
            StoreError::DuplicateId { .. } => ApiError::Conflict {
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest {
            message: format!("Invalid request body: {}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::InvalidTransition {
                current_state,
                allowed_transitions,
                ..
            } => json!({
                "detail": self.to_string(),
                "current_state": current_state,
                "allowed_transitions": allowed_transitions,
            }),
            _ => json!({ "detail": self.to_string() }),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), detail = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), detail = %self, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for the typed client
pub type ClientResult<T> = Result<T, ClientError>;
