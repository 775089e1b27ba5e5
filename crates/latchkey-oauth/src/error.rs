//! Error types for the credential broker.

use reqwest::StatusCode;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while driving the OAuth flow.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// The loopback listener could not be started.
    #[error("Callback listener error: {0}")]
    Listener(#[from] std::io::Error),

    /// Token exchange or refresh failed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Secure storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        OAuthError::Network(e.to_string())
    }
}

/// Failure of a single call to the token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The endpoint rejected the grant (HTTP 400/401): the code or refresh
    /// token is invalid, expired or revoked.
    #[error("token endpoint rejected the grant ({status}): {body}")]
    Rejected { status: StatusCode, body: String },

    /// Any other non-success HTTP status.
    #[error("token endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The request never produced an HTTP response.
    #[error("token request failed: {0}")]
    Transport(String),

    /// Success status but the body was not a usable token response.
    #[error("malformed token response: {0}")]
    Malformed(String),

    /// The caller cancelled the request.
    #[error("token request cancelled")]
    Cancelled,
}

impl ExchangeError {
    /// Whether this failure means the grant itself is dead and the local
    /// session must be discarded. Everything else is transient.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, ExchangeError::Rejected { .. })
    }

    pub(crate) fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            ExchangeError::Rejected { status, body }
        } else {
            ExchangeError::Status { status, body }
        }
    }
}

/// Errors raised by a [`SecureStorage`](crate::storage::SecureStorage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem error.
    #[error("storage I/O error at '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The stored data could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The OS keyring reported an error.
    #[error("keyring error: {0}")]
    Keyring(String),
}
