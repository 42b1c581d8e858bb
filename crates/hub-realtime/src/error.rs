//! Realtime connection error types.

use std::time::Duration;

/// Realtime connection errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection abnormally.
    #[error("Connection closed: {reason}")]
    ConnectionClosed {
        /// Close reason.
        reason: String,
        /// WebSocket close code, if the peer sent one.
        code: Option<u16>,
    },

    /// Push frame could not be decoded.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Handshake did not complete in time.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// No credential is available for the handshake.
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocketError(e.to_string())
    }
}

/// Result type for realtime operations.
pub type StreamResult<T> = Result<T, StreamError>;
