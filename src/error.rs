use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, services::sync_service::SyncError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable or a write could not be applied.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The fixture provider did not answer in time.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),
    /// The fixture provider failed or sent unusable data.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<SyncError> for ServiceError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidId(_) => ServiceError::InvalidInput(err.to_string()),
            SyncError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            SyncError::UpstreamTimeout { .. } => ServiceError::UpstreamTimeout(err.to_string()),
            SyncError::UpstreamFailure { .. } => ServiceError::UpstreamFailure(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Upstream provider did not answer in time.
    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),
    /// Upstream provider answered with an error.
    #[error("bad gateway: {0}")]
    BadGateway(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::UpstreamTimeout(message) => AppError::GatewayTimeout(message),
            ServiceError::UpstreamFailure(message) => AppError::BadGateway(message),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        ServiceError::from(err).into()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Endpoint;

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn sync_errors_map_to_gateway_statuses() {
        assert_eq!(
            status_of(
                SyncError::UpstreamTimeout {
                    endpoint: Endpoint::Events
                }
                .into()
            ),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(
                SyncError::UpstreamFailure {
                    endpoint: Endpoint::Fixture,
                    message: "503".into()
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_of(SyncError::NotFound(9).into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(SyncError::InvalidId("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn store_failures_are_unavailable() {
        let contention = StorageError::Contention {
            key: "message::match:1::abc".into(),
            attempts: 8,
        };
        assert_eq!(status_of(contention.into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(ServiceError::Degraded), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(ServiceError::InvalidState("chat closed".into())),
            StatusCode::CONFLICT
        );
    }
}
