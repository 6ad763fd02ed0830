// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed hook payload. Rejected at the boundary; no event is
    /// dispatched and no state is mutated.
    #[error("Malformed hook payload: {0}")]
    Protocol(String),

    /// `POST /hook/{kind}` with a kind outside the accepted set.
    #[error("Unknown hook kind: {0}")]
    UnknownHookKind(String),

    #[error("Session not found: {0}")]
    SessionNotFound(u32),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Protocol(msg) => {
                tracing::warn!(message = %msg, "rejected malformed hook payload");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Malformed hook payload", msg.clone()),
                )
            }
            ApiError::UnknownHookKind(kind) => {
                tracing::warn!(kind = %kind, "unknown hook kind");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Unknown hook kind", kind.clone()),
                )
            }
            ApiError::SessionNotFound(pid) => {
                tracing::warn!(pid, "session not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Session not found", format!("pid: {}", pid)),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_protocol_error_returns_400() {
        let error = ApiError::Protocol("missing field `session_id`".to_string());
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Malformed hook payload");
        assert!(body.details.unwrap().contains("session_id"));
    }

    #[tokio::test]
    async fn test_unknown_hook_kind_returns_404() {
        let error = ApiError::UnknownHookKind("sessionstart".to_string());
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Unknown hook kind");
    }

    #[tokio::test]
    async fn test_session_not_found_returns_404() {
        let error = ApiError::SessionNotFound(4242);
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.details.unwrap().contains("4242"));
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let error = ApiError::Internal("channel closed".to_string());
        let (status, body) = extract_response(error.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.details.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse::new("Test error");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\":\"Test error\""));
        assert!(!json.contains("details"));

        let response = ErrorResponse::with_details("Test error", "More info");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"details\":\"More info\""));
    }
}
