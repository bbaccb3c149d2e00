//! Session and identity holder.
//!
//! Owns authentication status and the user profile, and drives the
//! anonymous-to-authenticated cart transfer on every transition into the
//! authenticated state. The session holder initiates; the cart holder is
//! queried and mutated.
//!
//! Navigation is not performed here - operations return a [`Destination`]
//! and the shell decides how to get there.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use frozen_mango_core::{Email, EmailError};

use crate::api::types::{Profile, ProfileUpdate};
use crate::api::{ApiClient, ApiError};
use crate::auth::{AuthClient, AuthError, AuthEvent, OAuthProvider, SignUpOutcome};
use crate::services::cart::{CartError, CartService};

/// Authentication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; anonymous/local-only behavior applies.
    Unauthenticated,
    /// A sign-in or bootstrap is in flight.
    Authenticating,
    /// The boot URL carries a social sign-in redirect; the
    /// "no session means unauthenticated" transition is suppressed until
    /// the provider handshake completes.
    CallbackPending,
    /// A session is active and the profile is loaded.
    Authenticated,
}

/// Where the shell should navigate after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Home,
    Profile,
    /// Counter-sales surface for staff and admins.
    Operations,
}

/// Outcome of a registration attempt.
#[derive(Debug)]
pub enum RegisterOutcome {
    /// The provider issued a session; the user is signed in.
    SignedIn(Destination),
    /// The provider wants the email address confirmed first.
    ConfirmationRequired,
}

/// New-account payload.
#[derive(Debug, Clone)]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub birth_date: String,
}

/// Errors that can occur in the session holder.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("commerce API error: {0}")]
    Api(#[from] ApiError),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error("session expired, sign in again")]
    Expired,
    #[error("no active session")]
    MissingSession,
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
}

/// Session and identity holder.
///
/// Cheaply cloneable; all clones share state.
#[derive(Clone)]
pub struct SessionService {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    auth: AuthClient,
    cart: CartService,
    profile: RwLock<Option<Profile>>,
    state: RwLock<SessionState>,
    /// In-flight guard: duplicate concurrent bootstraps coalesce here
    /// instead of racing each other's fetches.
    bootstrap_guard: Mutex<()>,
}

impl SessionService {
    /// Create a new session service.
    #[must_use]
    pub fn new(api: ApiClient, auth: AuthClient, cart: CartService) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                auth,
                cart,
                profile: RwLock::new(None),
                state: RwLock::new(SessionState::Unauthenticated),
                bootstrap_guard: Mutex::new(()),
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        *self.inner.state.read().await
    }

    /// A clone of the loaded profile, if any.
    pub async fn profile(&self) -> Option<Profile> {
        self.inner.profile.read().await.clone()
    }

    /// Greeting name: first word of the profile name.
    pub async fn first_name(&self) -> Option<String> {
        self.inner
            .profile
            .read()
            .await
            .as_ref()
            .map(|profile| profile.first_name().to_string())
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Idempotent session bootstrap, run once at shell start.
    ///
    /// Restores a persisted session (refreshing it when expired), loads the
    /// profile, and runs the cart transfer check. Without a session, the
    /// state becomes [`SessionState::Unauthenticated`] - unless
    /// `current_url` is a social sign-in redirect, in which case
    /// [`SessionState::CallbackPending`] is held until
    /// [`Self::complete_oauth`] finishes the handshake.
    ///
    /// Duplicate concurrent calls coalesce on an internal guard.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile fetch fails for a reason other than
    /// an expired token (which forces a sign-out instead).
    #[instrument(skip_all)]
    pub async fn initialize(&self, current_url: Option<&str>) -> Result<SessionState, SessionError> {
        let _guard = self.inner.bootstrap_guard.lock().await;

        if *self.inner.state.read().await == SessionState::Authenticated {
            debug!("session already initialized");
            return Ok(SessionState::Authenticated);
        }
        self.set_state(SessionState::Authenticating).await;

        match self.inner.auth.restore_persisted().await? {
            Some(session) => {
                debug!(user = %session.user.id, "persisted session restored");
                match self.load_profile_and_cart().await {
                    Ok(()) => {
                        self.set_state(SessionState::Authenticated).await;
                        Ok(SessionState::Authenticated)
                    }
                    Err(SessionError::Expired) => {
                        // Token died between restore and profile fetch
                        self.set_state(SessionState::Unauthenticated).await;
                        Ok(SessionState::Unauthenticated)
                    }
                    Err(other) => {
                        self.set_state(SessionState::Unauthenticated).await;
                        Err(other)
                    }
                }
            }
            None => {
                let is_callback = current_url.is_some_and(AuthClient::is_oauth_callback);
                if is_callback {
                    debug!("no session but social redirect detected, holding callback state");
                    self.set_state(SessionState::CallbackPending).await;
                    Ok(SessionState::CallbackPending)
                } else {
                    self.clear_profile().await;
                    self.set_state(SessionState::Unauthenticated).await;
                    Ok(SessionState::Unauthenticated)
                }
            }
        }
    }

    // =========================================================================
    // Sign-in / sign-out
    // =========================================================================

    /// Authenticate with email and password.
    ///
    /// Fetches the profile, transfers any anonymous cart, reloads the
    /// server cart, and returns where the shell should go: staff and
    /// admins to the operations surface, customers to their profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the credentials or the
    /// post-login bootstrap fails.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Destination, SessionError> {
        self.set_state(SessionState::Authenticating).await;

        let result = async {
            self.inner.auth.sign_in_with_password(email, password).await?;
            self.load_profile_and_cart().await
        }
        .await;

        match result {
            Ok(()) => {
                self.set_state(SessionState::Authenticated).await;
                Ok(self.post_login_destination().await)
            }
            Err(error) => {
                self.set_state(SessionState::Unauthenticated).await;
                Err(error)
            }
        }
    }

    /// Start a social sign-in.
    ///
    /// Returns the authorize URL for the shell to open; completion arrives
    /// through [`Self::complete_oauth`] and the auth event channel, not as
    /// a return value here.
    ///
    /// # Errors
    ///
    /// Returns an error if the authorize URL cannot be built.
    pub async fn login_with_provider(&self, provider: OAuthProvider) -> Result<Url, SessionError> {
        let url = self.inner.auth.authorize_url(provider)?;
        self.set_state(SessionState::CallbackPending).await;
        Ok(url)
    }

    /// Finish a social sign-in from the provider redirect URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect is malformed or the post-login
    /// bootstrap fails.
    #[instrument(skip_all)]
    pub async fn complete_oauth(&self, callback_url: &str) -> Result<Destination, SessionError> {
        self.inner.auth.complete_oauth(callback_url).await?;
        self.load_profile_and_cart().await?;
        self.set_state(SessionState::Authenticated).await;
        Ok(self.post_login_destination().await)
    }

    /// End the session and clear local identity state.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures; an unreachable
    /// provider still signs the client out locally.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<Destination, SessionError> {
        self.inner.auth.sign_out().await?;
        self.clear_profile().await;
        self.set_state(SessionState::Unauthenticated).await;
        info!("signed out");
        Ok(Destination::Home)
    }

    /// Register a new account.
    ///
    /// When the provider issues a session right away the flow continues as
    /// a login; otherwise the caller should prompt for email confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the registration.
    #[instrument(skip(self, payload))]
    pub async fn register(&self, payload: RegisterPayload) -> Result<RegisterOutcome, SessionError> {
        Email::parse(&payload.email)?;
        let metadata = serde_json::json!({
            "name": payload.name,
            "phone": payload.phone,
            "birthDate": payload.birth_date,
        });
        let outcome = self
            .inner
            .auth
            .sign_up(&payload.email, &payload.password, metadata)
            .await?;

        match outcome {
            SignUpOutcome::Active(_) => {
                self.load_profile_and_cart().await?;
                self.set_state(SessionState::Authenticated).await;
                Ok(RegisterOutcome::SignedIn(self.post_login_destination().await))
            }
            SignUpOutcome::ConfirmationRequired => Ok(RegisterOutcome::ConfirmationRequired),
        }
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Push a profile update and re-fetch the stored profile.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingSession`] without a session, or the
    /// API's error.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), SessionError> {
        let token = self
            .inner
            .auth
            .access_token()
            .await
            .ok_or(SessionError::MissingSession)?;
        self.inner.api.update_profile(&token, update).await?;
        self.fetch_profile().await?;
        Ok(())
    }

    /// Fetch the profile for the active session.
    ///
    /// A rejected token forces a sign-out - expiry is unrecoverable for
    /// the current session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Expired`] after a forced sign-out, or the
    /// API's error.
    pub async fn fetch_profile(&self) -> Result<Profile, SessionError> {
        let token = self
            .inner
            .auth
            .access_token()
            .await
            .ok_or(SessionError::MissingSession)?;

        match self.inner.api.fetch_profile(&token).await {
            Ok(profile) => {
                *self.inner.profile.write().await = Some(profile.clone());
                Ok(profile)
            }
            Err(error) if error.is_unauthorized() => {
                warn!("profile fetch rejected, forcing sign-out");
                self.inner.auth.sign_out().await?;
                self.clear_profile().await;
                Err(SessionError::Expired)
            }
            Err(error) => Err(error.into()),
        }
    }

    // =========================================================================
    // Auth events
    // =========================================================================

    /// React to auth provider events (e.g. a social sign-in finishing in
    /// another window). The shell should spawn this once and keep the
    /// handle for shutdown.
    #[must_use]
    pub fn spawn_auth_listener(&self) -> JoinHandle<()> {
        let service = self.clone();
        let mut events = self.inner.auth.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedIn) => {
                        if service.profile().await.is_some() {
                            // complete_oauth/login already ran the bootstrap
                            continue;
                        }
                        debug!("sign-in event, running session bootstrap");
                        let _guard = service.inner.bootstrap_guard.lock().await;
                        if let Err(error) = service.load_profile_and_cart().await {
                            warn!(%error, "bootstrap after sign-in event failed");
                            continue;
                        }
                        service.set_state(SessionState::Authenticated).await;
                    }
                    Ok(AuthEvent::SignedOut) => {
                        service.clear_profile().await;
                        service.set_state(SessionState::Unauthenticated).await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Profile fetch plus the cart transfer protocol, shared by every path
    /// into the authenticated state.
    async fn load_profile_and_cart(&self) -> Result<(), SessionError> {
        self.fetch_profile().await?;
        self.transfer_anon_cart().await?;
        self.inner.cart.load_user_cart().await?;
        Ok(())
    }

    /// Transfer protocol: send the full anonymous snapshot, and clear it
    /// only when the server explicitly accepts. Failure keeps the snapshot
    /// for the next sign-in - the system's only, opportunistic, retry.
    async fn transfer_anon_cart(&self) -> Result<(), SessionError> {
        let items = self.inner.cart.anon_items()?;
        if items.is_empty() {
            return Ok(());
        }
        let token = self
            .inner
            .auth
            .access_token()
            .await
            .ok_or(SessionError::MissingSession)?;

        info!(lines = items.len(), "transferring anonymous cart");
        match self.inner.api.transfer_cart(&token, &items).await {
            Ok(()) => {
                self.inner.cart.clear_anon_snapshot()?;
                info!("anonymous cart transferred");
            }
            Err(error) => {
                warn!(%error, "cart transfer failed, keeping snapshot for the next sign-in");
            }
        }
        Ok(())
    }

    async fn post_login_destination(&self) -> Destination {
        let is_operations = self
            .inner
            .profile
            .read()
            .await
            .as_ref()
            .is_some_and(|profile| profile.role.is_operations());
        if is_operations {
            Destination::Operations
        } else {
            Destination::Profile
        }
    }

    async fn set_state(&self, state: SessionState) {
        *self.inner.state.write().await = state;
    }

    async fn clear_profile(&self) {
        *self.inner.profile.write().await = None;
    }
}
