//! Error types for AuthRelay
//!
//! A single error hierarchy built with thiserror. Claim decoding and
//! normalization never produce errors; everything here comes from the
//! refresh action, the identity provider, configuration, or storage.

use thiserror::Error;

/// Main error type for AuthRelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Identity provider error: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
        details: Option<serde_json::Value>,
    },

    /// Terminal for the session: the caller must sign in again.
    #[error("Session refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Session refresh timed out after {0:?}")]
    RefreshTimeout(std::time::Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Network(NetworkError::Reqwest(err))
    }
}

impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        RelayError::Network(NetworkError::InvalidUrl(err.to_string()))
    }
}

/// Convenient result type for AuthRelay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RelayError::Config(msg.into())
    }

    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        RelayError::Validation(msg.into())
    }

    #[inline]
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        RelayError::Unauthorized(msg.into())
    }

    #[inline]
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        RelayError::Forbidden(msg.into())
    }

    /// Create a provider error without upstream details
    #[inline]
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        RelayError::Provider {
            message: msg.into(),
            status: None,
            details: None,
        }
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        RelayError::Storage(msg.into())
    }

    /// True when the error ends the session and the user must re-authenticate
    pub fn is_terminal_for_session(&self) -> bool {
        matches!(
            self,
            RelayError::RefreshRejected(_) | RelayError::RefreshTimeout(_)
        )
    }
}
