//! Auth provider error type.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur when talking to the auth provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("auth provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// Email/password combination rejected by the provider.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Redirect callback URL is missing the expected tokens.
    #[error("malformed callback URL: {0}")]
    Callback(String),

    /// Provider response body could not be decoded.
    #[error("failed to decode provider response: {0}")]
    Decode(String),

    /// Publishable key cannot be sent as a header.
    #[error("invalid auth key: {0}")]
    InvalidKey(#[from] reqwest::header::InvalidHeaderValue),

    /// Persisting or clearing the local session failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// URL construction or parsing failed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
