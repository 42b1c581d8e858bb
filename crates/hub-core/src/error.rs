//! Core error types.

/// Errors raised while building or validating client configuration.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required configuration input was not supplied.
    #[error("Missing configuration input: {0}")]
    MissingInput(&'static str),

    /// URL parsing failed.
    #[error("URL parsing failed: {0}")]
    UrlError(#[from] url::ParseError),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
