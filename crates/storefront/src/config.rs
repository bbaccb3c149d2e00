//! Storefront engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `FROZEN_MANGO_API_URL` - Base URL of the commerce API
//! - `FROZEN_MANGO_AUTH_URL` - Base URL of the auth provider
//! - `FROZEN_MANGO_AUTH_ANON_KEY` - Auth provider publishable API key
//!
//! ## Optional
//! - `FROZEN_MANGO_STATE_PATH` - Local state database path
//!   (default: `<data dir>/frozen-mango/state.redb`)
//! - `FROZEN_MANGO_SYNC_DEBOUNCE_MS` - Cart sync debounce window (default: 1000)
//! - `FROZEN_MANGO_DEFAULT_SHIPPING_FEE` - Fallback delivery fee (default: 20.00)
//! - `FROZEN_MANGO_POSTAL_LOOKUP_URL` - Postal code lookup service
//!   (default: `https://viacep.com.br`)
//! - `FROZEN_MANGO_OAUTH_REDIRECT_URL` - Redirect target for social sign-in

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront engine configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Base URL of the commerce API
    pub api_url: String,
    /// Base URL of the external auth provider
    pub auth_url: String,
    /// Auth provider publishable key, sent as `apikey` on every auth call
    pub auth_anon_key: SecretString,
    /// Path of the local state database; `None` picks the platform default
    pub state_path: Option<PathBuf>,
    /// Quiet period before a cart edit is synced to the server
    pub sync_debounce: Duration,
    /// Delivery fee assumed when the shipping service is unavailable
    pub default_shipping_fee: Decimal,
    /// Base URL of the postal code lookup service
    pub postal_lookup_url: String,
    /// Redirect target appended to social sign-in authorize URLs
    pub oauth_redirect_url: Option<String>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = get_base_url("FROZEN_MANGO_API_URL")?;
        let auth_url = get_base_url("FROZEN_MANGO_AUTH_URL")?;
        let auth_anon_key = get_required_secret("FROZEN_MANGO_AUTH_ANON_KEY")?;

        let state_path = get_optional_env("FROZEN_MANGO_STATE_PATH").map(PathBuf::from);

        let debounce_ms = get_env_or_default("FROZEN_MANGO_SYNC_DEBOUNCE_MS", "1000")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("FROZEN_MANGO_SYNC_DEBOUNCE_MS".to_string(), e.to_string())
            })?;

        let default_shipping_fee = get_env_or_default("FROZEN_MANGO_DEFAULT_SHIPPING_FEE", "20.00")
            .parse::<Decimal>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar(
                    "FROZEN_MANGO_DEFAULT_SHIPPING_FEE".to_string(),
                    e.to_string(),
                )
            })?;
        if default_shipping_fee.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                "FROZEN_MANGO_DEFAULT_SHIPPING_FEE".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let postal_lookup_url = {
            let value =
                get_env_or_default("FROZEN_MANGO_POSTAL_LOOKUP_URL", "https://viacep.com.br");
            validate_url("FROZEN_MANGO_POSTAL_LOOKUP_URL", &value)?;
            value.trim_end_matches('/').to_string()
        };

        let oauth_redirect_url = get_optional_env("FROZEN_MANGO_OAUTH_REDIRECT_URL");
        if let Some(redirect) = &oauth_redirect_url {
            validate_url("FROZEN_MANGO_OAUTH_REDIRECT_URL", redirect)?;
        }

        Ok(Self {
            api_url,
            auth_url,
            auth_anon_key,
            state_path,
            sync_debounce: Duration::from_millis(debounce_ms),
            default_shipping_fee,
            postal_lookup_url,
            oauth_redirect_url,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a required environment variable holding a base URL, normalized
/// without a trailing slash.
fn get_base_url(key: &str) -> Result<String, ConfigError> {
    let value = get_required_env(key)?;
    validate_url(key, &value)?;
    Ok(value.trim_end_matches('/').to_string())
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(drop)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("X", "https://api.example.com").is_ok());
        assert!(validate_url("X", "not a url").is_err());
    }

    #[test]
    fn test_default_fee_parses() {
        let fee: Decimal = "20.00".parse().unwrap();
        assert!(!fee.is_sign_negative());
    }
}
