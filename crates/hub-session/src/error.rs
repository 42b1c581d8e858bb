//! Request error types.

/// Errors surfaced by authenticated requests.
///
/// `Clone` so that a single refresh outcome can be delivered to every
/// queued caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("API error {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Authentication failed on a request that was already retried.
    #[error("Authentication failed")]
    Unauthorized,

    /// The credential refresh failed; the session is over.
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),

    /// The response body did not match the expected shape.
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// The refresh coordinator went away before answering.
    #[error("Request abandoned before completion")]
    Abandoned,
}

impl ApiError {
    /// Whether this error means the caller's credential was rejected.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::RefreshFailed(_) | Self::Status { status: 401, .. }
        )
    }

    /// Whether the session can no longer be used.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::RefreshFailed(_))
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        let e = ApiError::Status {
            status: 404,
            message: "Not Found".into(),
        };
        assert_eq!(e.to_string(), "API error 404: Not Found");
    }

    #[test]
    fn refresh_failed_display() {
        let e = ApiError::RefreshFailed("API error 401: expired".into());
        assert_eq!(
            e.to_string(),
            "Credential refresh failed: API error 401: expired"
        );
    }

    #[test]
    fn only_refresh_failure_is_session_fatal() {
        assert!(ApiError::RefreshFailed("x".into()).is_session_fatal());
        assert!(!ApiError::Unauthorized.is_session_fatal());
        assert!(!ApiError::Http("reset".into()).is_session_fatal());
    }

    #[test]
    fn auth_failure_classification() {
        assert!(ApiError::Unauthorized.is_auth_failure());
        assert!(
            ApiError::Status {
                status: 401,
                message: String::new()
            }
            .is_auth_failure()
        );
        assert!(
            !ApiError::Status {
                status: 403,
                message: String::new()
            }
            .is_auth_failure()
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(ApiError::Http("timeout".into()).is_retryable());
        assert!(
            ApiError::Status {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ApiError::Status {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!ApiError::Unauthorized.is_retryable());
    }

    #[test]
    fn json_error_from() {
        let json_err: Result<serde_json::Value, _> = serde_json::from_str("bad");
        let e: ApiError = json_err.unwrap_err().into();
        assert!(matches!(e, ApiError::Decode(_)));
    }
}
