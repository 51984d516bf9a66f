//! Error taxonomy for calls against the marketplace API.
//!
//! Every transport- and status-level failure is normalized into [`ApiError`]
//! at the client boundary; nothing above the HTTP layer sees a raw
//! `reqwest::Error` or an untyped response body.

use serde::Deserialize;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur when talking to the marketplace API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (DNS, connection refused, TLS, offline).
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The request exceeded its timeout and was abandoned.
    #[error("request timed out")]
    Timeout,

    /// The server rejected the session (401). If the rejected token is
    /// still the stored one, it has been purged by the time this is returned.
    #[error("unauthorized")]
    Unauthorized,

    /// Request validation failed (422).
    #[error("validation failed: {}", .messages.join("; "))]
    ValidationFailed {
        /// Field messages flattened in the order the server listed them.
        messages: Vec<String>,
    },

    /// Rate limited (429).
    #[error("rate limited")]
    RateLimited {
        /// Seconds to wait, from `Retry-After`, when the server sent one.
        retry_after: Option<u64>,
    },

    /// Any other non-success status.
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Best-effort message from the response body.
        message: String,
    },

    /// A success response was missing expected fields or failed to parse.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Local session storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The request could not be built (bad path, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Text suitable for showing to the user in a banner or dialog.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkUnreachable(_) => {
                "Unable to reach the server. Check your internet connection.".to_string()
            }
            Self::Timeout => "The request took too long. Please try again.".to_string(),
            Self::Unauthorized => "Session expired. Please sign in again.".to_string(),
            Self::ValidationFailed { messages } if messages.is_empty() => {
                "Some of the information you entered is invalid.".to_string()
            }
            Self::ValidationFailed { messages } => messages.join("\n"),
            Self::RateLimited { .. } => {
                "Too many attempts. Please wait a few minutes and try again.".to_string()
            }
            Self::ServerError { message, .. } => message.clone(),
            Self::MalformedResponse(_) => "Unexpected response from the server.".to_string(),
            Self::Storage(_) => "Could not access the saved session on this device.".to_string(),
            Self::InvalidRequest(msg) => msg.clone(),
        }
    }

    /// HTTP status associated with the error, when there was a response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::ValidationFailed { .. } => Some(422),
            Self::RateLimited { .. } => Some(429),
            Self::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the endpoint itself is missing, so an alternate path may work.
    #[must_use]
    pub const fn is_missing_endpoint(&self) -> bool {
        matches!(self, Self::ServerError { status: 404 | 405, .. })
    }

    /// Classify a transport-level failure (no usable response).
    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::NetworkUnreachable(err.to_string())
        }
    }
}

/// Error body shapes the backend produces.
///
/// Laravel-style: `{"message": "...", "errors": {"field": ["msg", ...]}}`,
/// older handlers: `{"error": "..."}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ErrorBody {
    /// Parse leniently; anything that is not a JSON object yields an empty body.
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// `message`, else `error`, ignoring blanks.
    pub(crate) fn best_message(&self) -> Option<String> {
        [&self.message, &self.error]
            .into_iter()
            .flatten()
            .map(|m| m.trim())
            .find(|m| !m.is_empty())
            .map(ToString::to_string)
    }
}

/// Flatten a 422 `errors` object into its messages.
///
/// Field order is preserved and each field may hold a single string or an
/// array of strings.
pub(crate) fn flatten_validation_errors(
    errors: &serde_json::Map<String, serde_json::Value>,
) -> Vec<String> {
    let mut messages = Vec::new();
    for value in errors.values() {
        match value {
            serde_json::Value::String(msg) => messages.push(msg.clone()),
            serde_json::Value::Array(items) => messages.extend(
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(ToString::to_string),
            ),
            _ => {}
        }
    }
    messages
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_validation_errors_keeps_field_order() {
        let body = ErrorBody::parse(
            r#"{"message":"The given data was invalid.","errors":{"field1":["msg1"],"field2":["msg2","msg3"]}}"#,
        );
        let messages = flatten_validation_errors(&body.errors.unwrap());
        assert_eq!(messages, vec!["msg1", "msg2", "msg3"]);
    }

    #[test]
    fn test_flatten_preserves_server_order_not_alphabetical() {
        let body = ErrorBody::parse(r#"{"errors":{"username":["taken"],"email":["invalid"]}}"#);
        let messages = flatten_validation_errors(&body.errors.unwrap());
        assert_eq!(messages, vec!["taken", "invalid"]);
    }

    #[test]
    fn test_flatten_accepts_bare_strings() {
        let body = ErrorBody::parse(r#"{"errors":{"email":"required","n":3}}"#);
        let messages = flatten_validation_errors(&body.errors.unwrap());
        assert_eq!(messages, vec!["required"]);
    }

    #[test]
    fn test_validation_user_message_joins_lines() {
        let err = ApiError::ValidationFailed {
            messages: vec!["msg1".into(), "msg2".into(), "msg3".into()],
        };
        assert_eq!(err.user_message(), "msg1\nmsg2\nmsg3");
    }

    #[test]
    fn test_best_message_prefers_message_then_error() {
        assert_eq!(
            ErrorBody::parse(r#"{"message":"boom","error":"other"}"#).best_message(),
            Some("boom".to_string())
        );
        assert_eq!(
            ErrorBody::parse(r#"{"message":"  ","error":"other"}"#).best_message(),
            Some("other".to_string())
        );
        assert_eq!(ErrorBody::parse("<html>").best_message(), None);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Unauthorized.status(), Some(401));
        assert_eq!(ApiError::RateLimited { retry_after: None }.status(), Some(429));
        assert_eq!(ApiError::Timeout.status(), None);
    }

    #[test]
    fn test_missing_endpoint() {
        let err = ApiError::ServerError {
            status: 404,
            message: "Not Found".into(),
        };
        assert!(err.is_missing_endpoint());
        let err = ApiError::ServerError {
            status: 500,
            message: "boom".into(),
        };
        assert!(!err.is_missing_endpoint());
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::ServerError {
            status: 503,
            message: "maintenance".into(),
        };
        assert_eq!(err.to_string(), "server error (503): maintenance");
    }
}
