//! Structured transport errors shared across API endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Categories of transport errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// HTTP status error (4xx, 5xx) that was not an authentication failure
    /// eligible for retry
    HttpStatus,
    /// Connection timeout or request timeout
    Timeout,
    /// Other connection-level failure
    Network,
    /// Failed to parse a response (JSON parse error, invalid SSE, etc.)
    Parse,
    /// Backend envelope carried `success: false`
    Api,
    /// Authentication could not be recovered; the user must log in again
    SessionExpired,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::HttpStatus => write!(f, "http_status"),
            ApiErrorKind::Timeout => write!(f, "timeout"),
            ApiErrorKind::Network => write!(f, "network"),
            ApiErrorKind::Parse => write!(f, "parse"),
            ApiErrorKind::Api => write!(f, "api"),
            ApiErrorKind::SessionExpired => write!(f, "session_expired"),
        }
    }
}

/// Structured error from the transport with kind and details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error category
    pub kind: ApiErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g. raw error body)
    pub details: Option<String>,
}

impl ApiError {
    /// Creates a new transport error.
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error, extracting the backend message when the
    /// body carries one.
    pub fn http_status(status: u16, body: &Value) -> Self {
        let backend_message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str);

        let message = match backend_message {
            Some(msg) => format!("HTTP {status}: {msg}"),
            None => format!("HTTP {status}"),
        };
        let details = if body.is_null() {
            None
        } else {
            Some(body.to_string())
        };

        Self {
            kind: ApiErrorKind::HttpStatus,
            message,
            details,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, message)
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Parse, message)
    }

    /// Creates the error surfaced once token refresh has failed and the
    /// stored credentials were cleared.
    pub fn session_expired() -> Self {
        Self::new(
            ApiErrorKind::SessionExpired,
            "session expired, please log in again",
        )
    }

    /// Returns true if the user must re-authenticate before retrying.
    pub fn is_session_expired(&self) -> bool {
        self.kind == ApiErrorKind::SessionExpired
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type for transport operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Maps a reqwest transport failure to an `ApiError`.
pub(crate) fn classify_transport_error(e: &reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ApiError::new(ApiErrorKind::Network, format!("Connection failed: {e}"))
    } else {
        ApiError::new(ApiErrorKind::Network, format!("Network error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn http_status_extracts_backend_message() {
        let err = ApiError::http_status(500, &json!({"message": "boom"}));
        assert_eq!(err.kind, ApiErrorKind::HttpStatus);
        assert_eq!(err.message, "HTTP 500: boom");
        assert!(err.details.is_some());
    }

    #[test]
    fn http_status_falls_back_to_error_field() {
        let err = ApiError::http_status(502, &json!({"error": "bad gateway"}));
        assert_eq!(err.message, "HTTP 502: bad gateway");
    }

    #[test]
    fn http_status_without_body_has_no_details() {
        let err = ApiError::http_status(404, &Value::Null);
        assert_eq!(err.message, "HTTP 404");
        assert!(err.details.is_none());
    }
}
