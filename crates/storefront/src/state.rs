//! Application state shared across shells.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::auth::AuthClient;
use crate::config::StorefrontConfig;
use crate::error::AppError;
use crate::services::admin::{AdminCartService, AdminCheckoutService};
use crate::services::cart::CartService;
use crate::services::checkout::CheckoutService;
use crate::services::lookup::PostalLookupClient;
use crate::services::session::SessionService;
use crate::storage::LocalStore;

/// Application state shared across all shell code.
///
/// This struct is cheaply cloneable via `Arc` and provides access to every
/// engine service. Construct it once at startup and pass it by handle;
/// there are no global singletons behind it.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: LocalStore,
    auth: AuthClient,
    cart: CartService,
    session: SessionService,
    checkout: CheckoutService,
    admin_cart: AdminCartService,
    admin_checkout: AdminCheckoutService,
}

impl AppState {
    /// Wire up every service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be opened or a service
    /// fails to restore its persisted state.
    pub fn new(config: StorefrontConfig) -> Result<Self, AppError> {
        let store = LocalStore::open(config.state_path.as_deref())?;
        let api = ApiClient::new(&config.api_url);
        let auth = AuthClient::new(
            &config.auth_url,
            &config.auth_anon_key,
            store.clone(),
            config.oauth_redirect_url.clone(),
        )?;
        let lookup = PostalLookupClient::new(&config.postal_lookup_url);

        let cart = CartService::new(
            api.clone(),
            auth.clone(),
            store.clone(),
            config.sync_debounce,
        );
        let session = SessionService::new(api.clone(), auth.clone(), cart.clone());
        let checkout = CheckoutService::new(
            cart.clone(),
            api.clone(),
            auth.clone(),
            lookup,
            store.clone(),
            config.default_shipping_fee,
        )?;
        let admin_cart = AdminCartService::new(api.clone(), store.clone());
        let admin_checkout = AdminCheckoutService::new(
            admin_cart.clone(),
            api.clone(),
            auth.clone(),
            store.clone(),
        )?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                auth,
                cart,
                session,
                checkout,
                admin_cart,
                admin_checkout,
            }),
        })
    }

    /// Get a reference to the engine configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the local state store.
    #[must_use]
    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    /// Get a reference to the auth provider client.
    #[must_use]
    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    /// Get a reference to the cart state holder.
    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    /// Get a reference to the session holder.
    #[must_use]
    pub fn session(&self) -> &SessionService {
        &self.inner.session
    }

    /// Get a reference to the customer checkout flow.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    /// Get a reference to the counter-sales cart.
    #[must_use]
    pub fn admin_cart(&self) -> &AdminCartService {
        &self.inner.admin_cart
    }

    /// Get a reference to the counter-sales checkout.
    #[must_use]
    pub fn admin_checkout(&self) -> &AdminCheckoutService {
        &self.inner.admin_checkout
    }
}
