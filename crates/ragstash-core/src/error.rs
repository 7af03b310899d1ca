//! Error handling for Ragstash Core

use thiserror::Error;

/// Result type alias for Ragstash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Ragstash Core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Creation parameters are missing or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The provider tag does not name a known backend
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// No RAG is registered under this identity
    #[error("RAG not found: {0}")]
    NotFound(String),

    /// The index was never declared or populated on this backend
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// The backing store could not be reached or failed server-side
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend cannot process this content
    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a backend unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create an unsupported content error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedContent(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Stable machine-readable tag for transports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            Self::NotFound(_) => "NOT_FOUND",
            Self::IndexNotFound(_) => "INDEX_NOT_FOUND",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::UnsupportedContent(_) => "UNSUPPORTED_CONTENT",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Io(_) => "IO",
            Self::Other(_) => "OTHER",
        }
    }

    /// Whether resending the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        Self::unavailable(format!("Database error: {}", err))
    }
}

impl From<diesel::ConnectionError> for Error {
    fn from(err: diesel::ConnectionError) -> Self {
        Self::unavailable(format!("Database connection error: {}", err))
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Self::unavailable(format!("Connection pool error: {}", err))
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Self::unavailable(format!("MongoDB error: {}", err))
    }
}

#[cfg(feature = "lancedb")]
impl From<lancedb::Error> for Error {
    fn from(err: lancedb::Error) -> Self {
        Self::unavailable(format!("LanceDB error: {}", err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::other(format!("Background task failed: {}", err))
    }
}
