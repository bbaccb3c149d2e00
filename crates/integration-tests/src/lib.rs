//! Integration tests for Frozen Mango.
//!
//! Every test drives the real engine ([`AppState`]) against a `wiremock`
//! server standing in for both the commerce API and the auth provider,
//! with local state in a per-test temporary directory.
//!
//! # Test Categories
//!
//! - `cart_sync` - debounce, immediate syncs, anonymous isolation
//! - `session_flow` - login, cart transfer, forced sign-out, callbacks
//! - `checkout_flow` - shipping fallback, postal lookup, submission

#![allow(clippy::unwrap_used)]

use std::sync::Once;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use frozen_mango_storefront::auth::{AuthUser, Session};
use frozen_mango_storefront::config::StorefrontConfig;
use frozen_mango_storefront::state::AppState;
use frozen_mango_storefront::storage::keys;

/// Debounce window used by every test context; long enough to coalesce a
/// burst of edits, short enough to keep tests fast.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

static TRACING: Once = Once::new();

/// Engine plus the mock backend it talks to.
pub struct TestContext {
    pub server: MockServer,
    pub state: AppState,
    _state_dir: tempfile::TempDir,
}

impl TestContext {
    /// Start a mock backend and wire a fresh engine to it.
    pub async fn new() -> Self {
        TRACING.call_once(|| {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
                )
                .with_test_writer()
                .init();
        });

        let server = MockServer::start().await;
        let state_dir = tempfile::tempdir().unwrap();

        let config = StorefrontConfig {
            api_url: server.uri(),
            auth_url: server.uri(),
            auth_anon_key: SecretString::from("test-anon-key".to_owned()),
            state_path: Some(state_dir.path().join("state.redb")),
            sync_debounce: TEST_DEBOUNCE,
            default_shipping_fee: "20.00".parse().unwrap(),
            postal_lookup_url: server.uri(),
            oauth_redirect_url: None,
        };
        let state = AppState::new(config).unwrap();

        Self {
            server,
            state,
            _state_dir: state_dir,
        }
    }

    /// Mount `GET /products` with the standard two-product fixture.
    pub async fn mount_products(&self) {
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(products_fixture()))
            .mount(&self.server)
            .await;
    }

    /// Mount `GET /cart` returning `items`.
    pub async fn mount_server_cart(&self, items: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items })))
            .mount(&self.server)
            .await;
    }

    /// Mount `GET /users/profile` for a user with `role`.
    pub async fn mount_profile(&self, role: &str) {
        Mock::given(method("GET"))
            .and(path("/users/profile"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(profile_fixture(Uuid::new_v4(), role)),
            )
            .mount(&self.server)
            .await;
    }

    /// Mount the password grant endpoint issuing a one-hour session.
    pub async fn mount_password_grant(&self) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "test-access-token",
                "refresh_token": "test-refresh-token",
                "token_type": "bearer",
                "expires_in": 3600,
                "user": { "id": Uuid::new_v4(), "email": "ana@example.com" }
            })))
            .mount(&self.server)
            .await;
    }

    /// Persist a valid session so the next `initialize` restores it.
    pub fn persist_session(&self) {
        let session = Session {
            access_token: "test-access-token".to_string(),
            refresh_token: "test-refresh-token".to_string(),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: AuthUser {
                id: Uuid::new_v4(),
                email: Some("ana@example.com".to_string()),
            },
        };
        self.state
            .store()
            .put(keys::AUTH_SESSION, &session)
            .unwrap();
    }

    /// Requests the backend received for `http_method` + `request_path`.
    pub async fn requests_to(&self, http_method: &str, request_path: &str) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|request| {
                request.method.as_str() == http_method && request.url.path() == request_path
            })
            .collect()
    }
}

/// Two products: a cheap milk pop and a pricier tub.
pub fn products_fixture() -> serde_json::Value {
    json!([
        {
            "id": 1,
            "name": "Chocolate",
            "description": "Creamy and intense, the classic everyone loves.",
            "price": "2.00",
            "image": "cards/chocolate.png",
            "available": true,
            "category": "Milk Pops"
        },
        {
            "id": 2,
            "name": "Strawberry",
            "description": "Pure fruit, light and delicious.",
            "price": "1.50",
            "image": "cards/strawberry.png",
            "available": true,
            "category": "Fruit Pops"
        }
    ])
}

/// Profile envelope for `user_id` with `role`.
pub fn profile_fixture(user_id: Uuid, role: &str) -> serde_json::Value {
    json!({
        "user": {
            "userId": user_id,
            "name": "Ana Clara Souza",
            "email": "ana@example.com",
            "role": role,
            "phone": "(34) 99123-4567",
            "addresses": []
        }
    })
}
