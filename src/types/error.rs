//! Error types for taskgate
//!
//! One enum covers the whole gateway. Per-task failures are converted into
//! [`TaskError`](super::TaskError) records through [`GatewayError::kind`].

use hyper::StatusCode;
use serde::{Deserialize, Serialize};

/// Main error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Bad credentials. Deliberately carries no detail so callers cannot
    /// tell an unknown user from a wrong password.
    #[error("Authentication failed")]
    Auth,

    #[error("No route for source: {0}")]
    NoRoute(String),

    #[error("Public key not found: {0}")]
    KeyNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable tag for an error, carried in per-task error records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    AuthFailure,
    NoRoute,
    KeyNotFound,
    Transport,
    Decode,
    Config,
    Crypto,
    BadRequest,
    Internal,
    /// Reported by a partner organization about one of its tasks
    Remote,
}

impl Default for ErrorKind {
    fn default() -> Self {
        Self::Remote
    }
}

impl GatewayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::NoRoute(_) => StatusCode::NOT_FOUND,
            Self::KeyNotFound(_) => StatusCode::NOT_FOUND,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Decode(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Tag used when this error is reported against a single task
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth => ErrorKind::AuthFailure,
            Self::NoRoute(_) => ErrorKind::NoRoute,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Config(_) => ErrorKind::Config,
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
