//! Error taxonomy (§7). Each kind maps to one HTTP status and carries enough
//! context for the webserver envelope to report it without leaking internals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing API key")]
    Missing,
    #[error("invalid API key")]
    Invalid,
    #[error("tenant is not authorized for this operation")]
    Forbidden,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid value for field `{field}`: {message}")]
    InvalidField { field: String, message: String },
}

#[derive(Debug, thiserror::Error)]
#[error("sync already in progress (stage: {stage}, {percentage:.1}%)")]
pub struct ConflictError {
    pub sync_id: uuid::Uuid,
    pub stage: String,
    pub percentage: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("tenant root `{path}` is unreadable: {source}")]
    RootUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("embedding failed for chunk range {start}..{end}: {message}")]
pub struct EmbeddingError {
    pub start: usize,
    pub end: usize,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("answer generation failed: {0}")]
    Provider(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("catalog error: {0}")]
    Catalog(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("sync operation timed out after {elapsed_seconds}s (deadline {deadline_seconds}s)")]
pub struct TimeoutError {
    pub elapsed_seconds: i64,
    pub deadline_seconds: i64,
}

#[derive(Debug, thiserror::Error)]
#[error("sync operation {sync_id} was stuck and reset by the supervisor")]
pub struct StuckError {
    pub sync_id: uuid::Uuid,
}

/// The error union every HTTP handler may return, translated to the status
/// codes enumerated in §6.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Catalog(#[from] sqlx::Error),
    #[error("not yet implemented")]
    Unimplemented,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("query timed out after {0}s")]
    Timeout(u64),
}

impl From<ScannerError> for ApiError {
    fn from(err: ScannerError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<EmbeddingError> for ApiError {
    fn from(err: EmbeddingError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Missing | AuthError::Invalid => StatusCode::UNAUTHORIZED,
        };
        (
            status,
            Json(ErrorBody {
                error: "unauthorized".to_owned(),
                message: "missing or invalid credentials".to_owned(),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Auth(AuthError::Forbidden) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Auth(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Persistence(_) | ApiError::Catalog(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            ApiError::Unimplemented => (StatusCode::NOT_IMPLEMENTED, "unimplemented"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ApiError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        };

        let message = match &self {
            // Never leak whether the key existed.
            ApiError::Auth(_) => "missing or invalid credentials".to_owned(),
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                error: kind.to_owned(),
                message,
            }),
        )
            .into_response()
    }
}
