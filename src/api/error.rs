use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::backup::SnapshotError;
use crate::db::ConsoleError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Failure of a request, mapped to a status code and an `{"error": ...}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid request json: {}", rejection.body_text()))
    }
}

impl From<ConsoleError> for ApiError {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::Other(err) => ApiError::Internal(err),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<SnapshotError> for ApiError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::InvalidName(_)
            | SnapshotError::InvalidUpload(_)
            | SnapshotError::InvalidDatabase { .. } => ApiError::BadRequest(err.to_string()),
            SnapshotError::NotFound(_) => ApiError::NotFound(err.to_string()),
            SnapshotError::RestoreFailed(_) => ApiError::Internal(anyhow::Error::new(err)),
            SnapshotError::Other(err) => ApiError::Internal(err),
        }
    }
}

/// Run blocking database or filesystem work off the async runtime.
pub async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("worker join error: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);

        let err: ApiError = SnapshotError::InvalidName("../x.db".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err: ApiError = SnapshotError::NotFound("x.db".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err: ApiError = SnapshotError::RestoreFailed("disk full".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("disk full"));

        let err: ApiError = ConsoleError::NotReadOnly.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_carries_context_chain() {
        let err = ApiError::from(anyhow::anyhow!("no such table").context("Failed to list targets"));
        assert_eq!(err.to_string(), "Failed to list targets: no such table");
    }
}
