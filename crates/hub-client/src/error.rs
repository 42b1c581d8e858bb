//! Client session error types.

use hub_core::CoreError;
use hub_notify::SyncError;
use hub_session::ApiError;

/// Errors surfaced by [`crate::ClientSession`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] CoreError),

    /// A REST call failed outside the sync protocol.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The notification sync protocol failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The access credential handed to login was empty.
    #[error("Access credential must not be empty")]
    EmptyCredential,
}

impl ClientError {
    /// Whether the session ended and the user has to sign in again.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        match self {
            Self::Api(e) => e.is_session_fatal(),
            Self::Sync(e) => e.is_session_fatal(),
            Self::Config(_) | Self::EmptyCredential => false,
        }
    }
}

/// Result type for client session operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_is_transparent() {
        let e: ClientError = CoreError::InvalidConfig("page_size must be > 0".into()).into();
        assert_eq!(e.to_string(), "Invalid configuration: page_size must be > 0");
        assert!(!e.is_session_fatal());
    }

    #[test]
    fn refresh_failure_is_session_fatal_through_sync() {
        let e: ClientError = SyncError::from(ApiError::RefreshFailed("expired".into())).into();
        assert!(e.is_session_fatal());
    }
}
