//! External auth provider client.
//!
//! Boundary to the hosted identity service: password and social sign-in,
//! session persistence and refresh, sign-out. The provider's own protocol
//! (token issuance, OAuth redirects) stays on its side of the fence; this
//! module only drives it and holds the resulting session.
//!
//! State changes are published on a typed [`broadcast`] channel
//! ([`AuthEvent`]) instead of registered callbacks, so consumers get
//! well-defined delivery semantics rather than re-entrant notification.

mod error;

pub use error::AuthError;

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::storage::{LocalStore, keys};

/// Leeway subtracted from the expiry instant when deciding staleness.
const EXPIRY_LEEWAY_SECONDS: i64 = 30;

/// Capacity of the auth event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Social sign-in providers offered by the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Facebook,
}

impl OAuthProvider {
    /// Provider name as the auth service expects it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }
}

/// Identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session with the provider.
///
/// Persisted locally under [`keys::AUTH_SESSION`] so the engine can restore
/// identity across restarts. `Debug` redacts both tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    /// Whether the access token is expired (with leeway).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(EXPIRY_LEEWAY_SECONDS) >= self.expires_at
    }

    /// The access token wrapped for controlled exposure.
    #[must_use]
    pub fn bearer_token(&self) -> SecretString {
        SecretString::from(self.access_token.clone())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Auth state transition, published on the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A session became active (password, social, or sign-up).
    SignedIn,
    /// The session ended.
    SignedOut,
}

/// Outcome of a sign-up attempt.
#[derive(Debug)]
pub enum SignUpOutcome {
    /// The provider issued a session right away.
    Active(Session),
    /// The provider wants the email address confirmed first.
    ConfirmationRequired,
}

// =============================================================================
// AuthClient
// =============================================================================

/// Client for the external auth provider.
///
/// Cheaply cloneable; all clones share the session and the event channel.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthClientInner>,
}

struct AuthClientInner {
    client: reqwest::Client,
    base_url: String,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    store: LocalStore,
    redirect_url: Option<String>,
}

impl AuthClient {
    /// Create a new auth client.
    ///
    /// The publishable `anon_key` is attached to every request as the
    /// provider's `apikey` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be used as a header value.
    pub fn new(
        base_url: &str,
        anon_key: &SecretString,
        store: LocalStore,
        redirect_url: Option<String>,
    ) -> Result<Self, AuthError> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(anon_key.expose_secret())?;
        api_key.set_sensitive(true);
        headers.insert("apikey", api_key);

        let client = reqwest::Client::builder().default_headers(headers).build()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(AuthClientInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                session: RwLock::new(None),
                events,
                store,
                redirect_url,
            }),
        })
    }

    /// Subscribe to auth state transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// A clone of the current session, if any.
    pub async fn session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }

    /// The current access token, if a session is active.
    ///
    /// Absence routes callers to the anonymous/local-only path.
    pub async fn access_token(&self) -> Option<SecretString> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(Session::bearer_token)
    }

    /// Whether a non-expired session is active.
    pub async fn is_authenticated(&self) -> bool {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| !s.is_expired())
    }

    // =========================================================================
    // Sign-in / sign-up
    // =========================================================================

    /// Authenticate with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] when the provider rejects
    /// the pair, or a transport/decoding error otherwise.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type=password", self.inner.base_url);
        let response = self
            .inner
            .client
            .post(&url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(AuthError::InvalidCredentials);
        }
        let token: TokenResponse = Self::decode(response).await?;

        let session = token.into_session();
        self.replace_session(Some(session.clone()), Some(AuthEvent::SignedIn))
            .await?;
        info!(user = %session.user.id, "signed in with password");
        Ok(session)
    }

    /// Register a new account, with free-form profile metadata the backend
    /// picks up on first profile fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the registration.
    #[instrument(skip(self, password, metadata))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, AuthError> {
        let url = format!("{}/signup", self.inner.base_url);
        let response = self
            .inner
            .client
            .post(&url)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await?;
        let signup: SignUpResponse = Self::decode(response).await?;

        match signup.into_session() {
            Some(session) => {
                self.replace_session(Some(session.clone()), Some(AuthEvent::SignedIn))
                    .await?;
                Ok(SignUpOutcome::Active(session))
            }
            None => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    // =========================================================================
    // Social sign-in
    // =========================================================================

    /// Build the authorize URL the shell should open for a social sign-in.
    ///
    /// Completion is observed later through [`Self::complete_oauth`], not as
    /// a return value here.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider base URL is malformed.
    pub fn authorize_url(&self, provider: OAuthProvider) -> Result<Url, AuthError> {
        let mut url = Url::parse(&format!("{}/authorize", self.inner.base_url))?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str());
        if let Some(redirect) = &self.inner.redirect_url {
            url.query_pairs_mut().append_pair("redirect_to", redirect);
        }
        Ok(url)
    }

    /// Whether `current_url` is a redirect back from a social sign-in
    /// (fragment carries tokens, or the query carries an auth code).
    #[must_use]
    pub fn is_oauth_callback(current_url: &str) -> bool {
        let Ok(url) = Url::parse(current_url) else {
            return false;
        };
        let fragment_has_token = url
            .fragment()
            .is_some_and(|fragment| fragment.contains("access_token="));
        let query_has_code = url.query_pairs().any(|(name, _)| name == "code");
        fragment_has_token || query_has_code
    }

    /// Finish a social sign-in from the provider redirect URL.
    ///
    /// Supports both the fragment (implicit) flow and the auth-code flow.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Callback`] if the URL carries neither tokens nor
    /// a code, or a transport error if the follow-up calls fail.
    #[instrument(skip_all)]
    pub async fn complete_oauth(&self, callback_url: &str) -> Result<Session, AuthError> {
        let url = Url::parse(callback_url)?;

        let session = if let Some(fragment) = url.fragment().filter(|f| f.contains("access_token="))
        {
            self.session_from_fragment(fragment).await?
        } else if let Some(code) = url
            .query_pairs()
            .find(|(name, _)| name == "code")
            .map(|(_, value)| value.into_owned())
        {
            self.exchange_code(&code).await?
        } else {
            return Err(AuthError::Callback(
                "redirect carries neither tokens nor a code".to_string(),
            ));
        };

        self.replace_session(Some(session.clone()), Some(AuthEvent::SignedIn))
            .await?;
        info!(user = %session.user.id, "social sign-in completed");
        Ok(session)
    }

    /// Parse fragment tokens and resolve the user behind them.
    async fn session_from_fragment(&self, fragment: &str) -> Result<Session, AuthError> {
        let mut access_token = None;
        let mut refresh_token = None;
        let mut expires_in = None;
        for (name, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match name.as_ref() {
                "access_token" => access_token = Some(value.into_owned()),
                "refresh_token" => refresh_token = Some(value.into_owned()),
                "expires_in" => expires_in = value.parse::<i64>().ok(),
                _ => {}
            }
        }
        let access_token = access_token
            .ok_or_else(|| AuthError::Callback("fragment is missing access_token".to_string()))?;
        let refresh_token = refresh_token.unwrap_or_default();

        let user = self.fetch_user(&access_token).await?;
        let expires_at = expires_in
            .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds))
            .or_else(|| jwt_expiry(&access_token))
            .unwrap_or_else(|| Utc::now() + ChronoDuration::hours(1));

        Ok(Session {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_at,
            user,
        })
    }

    /// Exchange an auth code for a session.
    async fn exchange_code(&self, code: &str) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type=pkce", self.inner.base_url);
        let response = self
            .inner
            .client
            .post(&url)
            .json(&serde_json::json!({ "auth_code": code }))
            .send()
            .await?;
        let token: TokenResponse = Self::decode(response).await?;
        Ok(token.into_session())
    }

    /// Resolve the identity behind an access token (`GET /user`).
    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let url = format!("{}/user", self.inner.base_url);
        let response = self
            .inner
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::decode(response).await
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Restore the persisted session, refreshing it when expired.
    ///
    /// Does not publish events: restoring is not a state transition the
    /// session holder needs to react to, it drives the bootstrap itself.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures; an unusable
    /// persisted session is discarded and reported as `None`.
    #[instrument(skip(self))]
    pub async fn restore_persisted(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.inner.store.get::<Session>(keys::AUTH_SESSION)? else {
            return Ok(None);
        };

        if !session.is_expired() {
            *self.inner.session.write().await = Some(session.clone());
            return Ok(Some(session));
        }

        debug!("persisted session expired, attempting refresh");
        match self.refresh_with(&session.refresh_token).await {
            Ok(refreshed) => {
                self.replace_session(Some(refreshed.clone()), None).await?;
                Ok(Some(refreshed))
            }
            Err(error) => {
                warn!(%error, "session refresh failed, discarding persisted session");
                self.inner.store.delete(keys::AUTH_SESSION)?;
                Ok(None)
            }
        }
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type=refresh_token", self.inner.base_url);
        let response = self
            .inner
            .client
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let token: TokenResponse = Self::decode(response).await?;
        Ok(token.into_session())
    }

    /// End the session with the provider and locally.
    ///
    /// The local session is cleared even when the remote call fails; an
    /// unreachable provider must not leave the client signed in.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.session().await {
            let url = format!("{}/logout", self.inner.base_url);
            let result = self
                .inner
                .client
                .post(&url)
                .bearer_auth(&session.access_token)
                .send()
                .await;
            if let Err(error) = result {
                warn!(%error, "provider sign-out failed, clearing local session anyway");
            }
        }
        self.replace_session(None, Some(AuthEvent::SignedOut)).await
    }

    /// Swap the in-memory session, persist the change, and publish `event`.
    async fn replace_session(
        &self,
        session: Option<Session>,
        event: Option<AuthEvent>,
    ) -> Result<(), AuthError> {
        match &session {
            Some(s) => self.inner.store.put(keys::AUTH_SESSION, s)?,
            None => self.inner.store.delete(keys::AUTH_SESSION)?,
        }
        *self.inner.session.write().await = session;
        if let Some(event) = event {
            // No receivers is fine: the shell may not care about auth events
            self.inner.events.send(event).ok();
        }
        Ok(())
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            expires_at: Utc::now() + ChronoDuration::seconds(self.expires_in),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            user: self.user,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<AuthUser>,
}

impl SignUpResponse {
    fn into_session(self) -> Option<Session> {
        let access_token = self.access_token?;
        let user = self.user?;
        let expires_at = self
            .expires_in
            .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds))
            .or_else(|| jwt_expiry(&access_token))?;
        Some(Session {
            access_token,
            refresh_token: self.refresh_token.unwrap_or_default(),
            token_type: "bearer".to_string(),
            expires_at,
            user,
        })
    }
}

/// Read the `exp` claim out of a JWT without verifying it.
///
/// Good enough for client-side staleness checks; the API is the verifier.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.get("exp")?.as_i64()?, 0)
}
