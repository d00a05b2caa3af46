use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// ValidationError
///
/// Raised while normalizing an incoming `LessonPayload` into a `LessonInput`.
/// Each variant names the offending field so the admin form can show it inline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} must be an absolute http(s) URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("link #{index} is missing a {field}")]
    IncompleteLink { index: usize, field: &'static str },

    #[error("unsupported upload content type: {0}")]
    UnsupportedContentType(String),

    #[error("malformed request: {0}")]
    Malformed(String),
}

/// StoreError
///
/// Failures surfaced by any `LessonRepository` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lesson not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row could not be normalized into a `Lesson` (e.g. no placement columns).
    #[error("corrupt lesson row {id}: {reason}")]
    Corrupt { id: uuid::Uuid, reason: String },
}

/// ApiError
///
/// The boundary error type. Every handler returns `Result<_, ApiError>` so that
/// failures always leave the service as a JSON body plus an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Lesson not found")]
    NotFound,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage failure")]
    Store(StoreError),

    #[error("media storage failure")]
    Media(#[from] crate::storage::StorageError),
}

/// ErrorBody
///
/// JSON shape of every error response: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub error: String,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Store details stay in the logs; clients get a generic message.
        let message = match &self {
            ApiError::Store(err) => {
                tracing::error!(error = %err, "lesson store operation failed");
                "Failed to process lesson request".to_string()
            }
            ApiError::Media(err) => {
                tracing::error!(error = %err, "media storage operation failed");
                "Failed to prepare media upload".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
