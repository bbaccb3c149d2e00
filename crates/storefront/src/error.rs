//! Unified error handling.
//!
//! Every service has its own `thiserror` enum; `AppError` folds them into
//! one type for shells that want a single error channel, with conversions
//! via `#[from]`.

use thiserror::Error;

use crate::api::ApiError;
use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::services::cart::CartError;
use crate::services::checkout::{CheckoutError, ValidationError};
use crate::services::session::SessionError;
use crate::storage::StorageError;

/// Application-level error type for the storefront engine.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Commerce API operation failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Auth provider operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Session operation failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Checkout operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Local state store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Client-side schema check failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
