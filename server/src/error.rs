//! Errors surfaced to HTTP callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::broker::BrokerError;
use crate::db::StoreError;

/// Request-level failure. Rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// The request body could not be accepted. Never retried.
    BadRequest(String),
    /// Persisting to the message store failed.
    Store(StoreError),
    /// Handing the message to the broker failed.
    Broker(BrokerError),
    /// Encoding an accepted message failed.
    Encode(serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Broker(_) | ApiError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(e) => write!(f, "{}", e),
            ApiError::Store(e) => write!(f, "{}", e),
            ApiError::Broker(e) => write!(f, "{}", e),
            ApiError::Encode(e) => write!(f, "Failed to encode message: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        ApiError::Broker(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::BadRequest("missing field `time`".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Store(StoreError::Lock).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Broker(BrokerError::Closed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bad_request_message_is_verbatim() {
        let err = ApiError::BadRequest("message must not be empty".into());
        assert_eq!(err.to_string(), "message must not be empty");
    }
}
