use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sewa_store::StoreError;
use thiserror::Error;

/// Failure of a booking, conversation or payment operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence did not respond in time")]
    Timeout,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::InvalidArgument(_) | ServiceError::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show to a client. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("Record not found".into()),
            other => {
                tracing::error!(error = %other, "Store failure");
                ServiceError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.public_message(),
        });

        (self.status_code(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::InvalidState("terminal".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ServiceError::Conflict("paid".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = ServiceError::Internal("disk I/O error at /var/lib".into());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(
            ServiceError::from(StoreError::NotFound),
            ServiceError::NotFound("Record not found".into())
        );
    }
}
