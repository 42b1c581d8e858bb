//! Notification sync error types.

use hub_session::ApiError;

/// Errors surfaced by the notification sync protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The REST call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A count in a server response does not fit this platform.
    #[error("Server reported an out-of-range count: {0}")]
    CountOutOfRange(u64),

    /// The user signed in or out while the request was in flight; its
    /// result was discarded.
    #[error("Session changed while the request was in flight")]
    SessionChanged,
}

impl SyncError {
    /// Whether the session ended while syncing.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_session_fatal())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_is_transparent() {
        let e: SyncError = ApiError::Status {
            status: 503,
            message: "Service Unavailable".into(),
        }
        .into();
        assert_eq!(e.to_string(), "API error 503: Service Unavailable");
    }

    #[test]
    fn session_fatal_follows_api_error() {
        let e: SyncError = ApiError::RefreshFailed("expired".into()).into();
        assert!(e.is_session_fatal());
        assert!(!SyncError::CountOutOfRange(u64::MAX).is_session_fatal());
        assert!(!SyncError::SessionChanged.is_session_fatal());
    }
}
