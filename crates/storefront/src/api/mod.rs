//! Commerce API client.
//!
//! REST client for the remote commerce service backing the storefront:
//! catalog, authenticated cart, profile, shipping, and checkout endpoints.
//! The product catalog is cached for five minutes using `moka`.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use types::{
    CartItemPayload, CartItemsBody, CheckoutRequest, CheckoutResponse, Product, Profile,
    ProfileEnvelope, ProfileUpdate, ShippingQuote, ShippingRequest,
};

/// Cache TTL for the product catalog.
const PRODUCTS_CACHE_TTL: Duration = Duration::from_secs(300); // 5 minutes

/// Errors that can occur when talking to the commerce API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (network, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the failure means the bearer token was rejected.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}

/// Client for the remote commerce API.
///
/// Cheaply cloneable; endpoints taking a token are the authenticated
/// surface, everything else is anonymous.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: String,
    products_cache: Cache<&'static str, Arc<Vec<Product>>>,
}

impl ApiClient {
    /// Create a new commerce API client for `base_url`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        let products_cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(PRODUCTS_CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(ApiClientInner {
                client: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_string(),
                products_cache,
            }),
        }
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Fetch the full product catalog (`GET /products`), cached for five
    /// minutes.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    #[instrument(skip(self))]
    pub async fn fetch_products(&self) -> Result<Arc<Vec<Product>>, ApiError> {
        if let Some(cached) = self.inner.products_cache.get("products").await {
            debug!("catalog served from cache");
            return Ok(cached);
        }

        let url = format!("{}/products", self.inner.base_url);
        let products: Vec<Product> = self.get_json(&url, None).await?;
        let products = Arc::new(products);
        self.inner
            .products_cache
            .insert("products", Arc::clone(&products))
            .await;
        Ok(products)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Fetch the authenticated user's saved cart (`GET /cart`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    #[instrument(skip(self, token))]
    pub async fn fetch_cart(&self, token: &SecretString) -> Result<Vec<CartItemPayload>, ApiError> {
        let url = format!("{}/cart", self.inner.base_url);
        let body: CartItemsBody = self.get_json(&url, Some(token)).await?;
        Ok(body.items)
    }

    /// Overwrite the authenticated user's saved cart (`PUT /cart/sync`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    #[instrument(skip(self, token, items), fields(lines = items.len()))]
    pub async fn sync_cart(
        &self,
        token: &SecretString,
        items: &[CartItemPayload],
    ) -> Result<(), ApiError> {
        let url = format!("{}/cart/sync", self.inner.base_url);
        let body = CartItemsBody {
            items: items.to_vec(),
        };
        let response = self
            .inner
            .client
            .put(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await.map(drop)
    }

    /// Merge anonymous cart items into the authenticated account
    /// (`POST /cart/transfer`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; callers must keep the
    /// anonymous snapshot in that case.
    #[instrument(skip(self, token, items), fields(lines = items.len()))]
    pub async fn transfer_cart(
        &self,
        token: &SecretString,
        items: &[CartItemPayload],
    ) -> Result<(), ApiError> {
        let url = format!("{}/cart/transfer", self.inner.base_url);
        let body = CartItemsBody {
            items: items.to_vec(),
        };
        let response = self
            .inner
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await.map(drop)
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Fetch the authenticated user's profile (`GET /users/profile`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    #[instrument(skip(self, token))]
    pub async fn fetch_profile(&self, token: &SecretString) -> Result<Profile, ApiError> {
        let url = format!("{}/users/profile", self.inner.base_url);
        let envelope: ProfileEnvelope = self.get_json(&url, Some(token)).await?;
        Ok(envelope.user)
    }

    /// Update the authenticated user's profile (`PUT /users/profile`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    #[instrument(skip(self, token, update))]
    pub async fn update_profile(
        &self,
        token: &SecretString,
        update: &ProfileUpdate,
    ) -> Result<(), ApiError> {
        let url = format!("{}/users/profile", self.inner.base_url);
        let response = self
            .inner
            .client
            .put(&url)
            .bearer_auth(token.expose_secret())
            .json(update)
            .send()
            .await?;
        Self::check_status(response).await.map(drop)
    }

    // =========================================================================
    // Shipping & checkout
    // =========================================================================

    /// Quote the delivery fee for an address (`POST /shipping/calculate`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; callers fall back to the
    /// configured default fee.
    #[instrument(skip(self, request))]
    pub async fn calculate_shipping(
        &self,
        request: &ShippingRequest,
    ) -> Result<ShippingQuote, ApiError> {
        let url = format!("{}/shipping/calculate", self.inner.base_url);
        self.post_json(&url, None, request).await
    }

    /// Submit an order (`POST /cart/checkout`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip_all)]
    pub async fn checkout(
        &self,
        token: Option<&SecretString>,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResponse, ApiError> {
        let url = format!("{}/cart/checkout", self.inner.base_url);
        self.post_json(&url, token, request).await
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&SecretString>,
    ) -> Result<T, ApiError> {
        let mut request = self.inner.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request.send().await?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&SecretString>,
        body: &B,
    ) -> Result<T, ApiError> {
        let mut request = self.inner.client.post(url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request.send().await?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
