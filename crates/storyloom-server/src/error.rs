//! Storyloom — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use storyloom_core::error::SyncError;

/// Startup and runtime errors for the sync server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `SyncError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            SyncError::ValidationFailed(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            SyncError::StaleVersion { .. } => (StatusCode::CONFLICT, "stale_version"),
            SyncError::SequenceGap { .. } => (StatusCode::CONFLICT, "sequence_gap"),
            SyncError::NetworkUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "network_unavailable")
            }
            SyncError::PersistenceFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn status_of(err: SyncError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_validation_failed_maps_to_400() {
        assert_eq!(
            status_of(SyncError::ValidationFailed("bad input".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_stale_version_maps_to_409() {
        assert_eq!(
            status_of(SyncError::StaleVersion {
                command_id: Uuid::new_v4(),
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_sequence_gap_maps_to_409() {
        assert_eq!(
            status_of(SyncError::SequenceGap {
                expected: 4,
                found: 7,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_network_unavailable_maps_to_503() {
        assert_eq!(
            status_of(SyncError::NetworkUnavailable("link down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_persistence_failure_maps_to_500() {
        assert_eq!(
            status_of(SyncError::PersistenceFailure("disk full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
