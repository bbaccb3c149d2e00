//! Cart synchronization behavior: debounce coalescing, immediate syncs,
//! and the anonymous/authenticated boundary.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use frozen_mango_core::ProductId;
use frozen_mango_integration_tests::{TEST_DEBOUNCE, TestContext};
use frozen_mango_storefront::api::types::CartItemsBody;

/// Long enough for any scheduled debounce to have fired.
const SETTLE: Duration = Duration::from_millis(300);

async fn authenticated_context() -> TestContext {
    let ctx = TestContext::new().await;
    ctx.mount_products().await;
    ctx.mount_profile("CUSTOMER").await;
    ctx.mount_server_cart(json!([])).await;
    ctx.persist_session();
    ctx.state.session().initialize(None).await.unwrap();
    ctx.state.cart().fetch_catalog().await.unwrap();
    ctx
}

#[tokio::test]
async fn test_three_updates_in_window_produce_one_sync() {
    let ctx = authenticated_context().await;
    Mock::given(method("PUT"))
        .and(path("/cart/sync"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let cart = ctx.state.cart();
    cart.update_quantity(ProductId::new(1), 1).await.unwrap();
    cart.update_quantity(ProductId::new(1), 2).await.unwrap();
    cart.update_quantity(ProductId::new(1), 3).await.unwrap();
    assert!(cart.has_pending_sync().await);

    tokio::time::sleep(TEST_DEBOUNCE + SETTLE).await;

    // Exactly one request, reflecting the last state at fire time
    let requests = ctx.requests_to("PUT", "/cart/sync").await;
    assert_eq!(requests.len(), 1);
    let body: CartItemsBody = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body.items.len(), 1);
    assert_eq!(body.items[0].product_id, ProductId::new(1));
    assert_eq!(body.items[0].quantity, 3);
}

#[tokio::test]
async fn test_empty_cart_skips_debounce() {
    let ctx = authenticated_context().await;
    Mock::given(method("PUT"))
        .and(path("/cart/sync"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let cart = ctx.state.cart();
    cart.update_quantity(ProductId::new(1), 2).await.unwrap();
    // Emptying cancels the scheduled sync and pushes right away
    cart.empty_cart().await.unwrap();

    let requests = ctx.requests_to("PUT", "/cart/sync").await;
    assert_eq!(requests.len(), 1);
    let body: CartItemsBody = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.items.is_empty());

    // And the debounce window passing adds nothing
    tokio::time::sleep(TEST_DEBOUNCE + SETTLE).await;
    assert_eq!(ctx.requests_to("PUT", "/cart/sync").await.len(), 1);
}

#[tokio::test]
async fn test_anonymous_edits_never_sync() {
    let ctx = TestContext::new().await;
    ctx.mount_products().await;
    Mock::given(method("PUT"))
        .and(path("/cart/sync"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ctx.server)
        .await;

    let cart = ctx.state.cart();
    cart.fetch_catalog().await.unwrap();
    cart.update_quantity(ProductId::new(1), 2).await.unwrap();
    cart.update_quantity(ProductId::new(2), 1).await.unwrap();

    tokio::time::sleep(TEST_DEBOUNCE + SETTLE).await;

    // Edits landed in the local snapshot instead
    let items = cart.anon_items().unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn test_catalog_failure_leaves_empty_catalog_and_reports() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&ctx.server)
        .await;

    let result = ctx.state.cart().fetch_catalog().await;
    assert!(result.is_err(), "failure must surface so a retry can be offered");
    assert!(ctx.state.cart().catalog().await.is_empty());
}

#[tokio::test]
async fn test_server_cart_failure_degrades_to_snapshot() {
    let ctx = TestContext::new().await;
    ctx.mount_products().await;
    ctx.mount_profile("CUSTOMER").await;
    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.server)
        .await;

    // Anonymous snapshot written before sign-in
    let cart = ctx.state.cart();
    cart.fetch_catalog().await.unwrap();
    cart.update_quantity(ProductId::new(2), 5).await.unwrap();

    // Transfer also fails, so the snapshot survives and is the fallback
    Mock::given(method("POST"))
        .and(path("/cart/transfer"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.server)
        .await;
    ctx.persist_session();
    ctx.state.session().initialize(None).await.unwrap();

    assert_eq!(cart.quantity_of(ProductId::new(2)).await, Some(5));
}
