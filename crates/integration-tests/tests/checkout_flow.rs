//! Checkout: shipping fallback, postal autofill, submission and the
//! cleanup that follows it.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use frozen_mango_core::{OrderId, ProductId};
use frozen_mango_integration_tests::TestContext;
use frozen_mango_storefront::api::types::DeliveryMethod;
use frozen_mango_storefront::services::checkout::{
    AddressForm, CheckoutError, PersonalData, Schedule,
};
use frozen_mango_storefront::storage::keys;

fn valid_personal() -> PersonalData {
    PersonalData {
        full_name: "Ana Clara Souza".to_string(),
        email: "ana@example.com".to_string(),
        tax_id: "123.456.789-09".to_string(),
        phone: "(34) 99123-4567".to_string(),
        birth_date: "21/03/1994".to_string(),
    }
}

fn valid_address() -> AddressForm {
    AddressForm {
        postal_code: "38400-100".to_string(),
        street: "Rua das Acacias".to_string(),
        number: "120".to_string(),
        complement: String::new(),
        neighborhood: "Centro".to_string(),
        city: "Uberaba".to_string(),
        state: "MG".to_string(),
    }
}

#[tokio::test]
async fn test_shipping_quote_is_used_when_available() {
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path("/shipping/calculate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fee": 12.5,
            "distance": 3.2
        })))
        .mount(&ctx.server)
        .await;

    let checkout = ctx.state.checkout();
    checkout.set_address(valid_address()).await.unwrap();
    checkout
        .set_delivery_method(DeliveryMethod::Delivery)
        .await
        .unwrap();

    let fee = checkout.refresh_shipping_quote().await;
    assert_eq!(fee, "12.5".parse().unwrap());
    assert_eq!(checkout.delivery_fee().await, "12.5".parse().unwrap());
}

#[tokio::test]
async fn test_shipping_failure_assumes_default_fee() {
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path("/shipping/calculate"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&ctx.server)
        .await;

    let checkout = ctx.state.checkout();
    checkout.set_address(valid_address()).await.unwrap();
    checkout
        .set_delivery_method(DeliveryMethod::Delivery)
        .await
        .unwrap();

    let fee = checkout.refresh_shipping_quote().await;
    assert_eq!(fee, "20.00".parse().unwrap());
}

#[tokio::test]
async fn test_pickup_has_no_delivery_fee() {
    let ctx = TestContext::new().await;
    let checkout = ctx.state.checkout();
    checkout
        .set_delivery_method(DeliveryMethod::Pickup)
        .await
        .unwrap();
    assert_eq!(checkout.refresh_shipping_quote().await, 0.into());
    assert_eq!(checkout.delivery_fee().await, 0.into());
}

#[tokio::test]
async fn test_postal_lookup_fills_address_fields() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/ws/38400100/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logradouro": "Avenida Leopoldino de Oliveira",
            "bairro": "Estados Unidos",
            "localidade": "Uberaba",
            "uf": "MG"
        })))
        .mount(&ctx.server)
        .await;

    let checkout = ctx.state.checkout();
    checkout
        .set_address(AddressForm {
            postal_code: "38400-100".to_string(),
            ..AddressForm::default()
        })
        .await
        .unwrap();
    checkout.lookup_postal_code().await.unwrap();

    let draft = checkout.draft().await;
    assert_eq!(draft.address.street, "Avenida Leopoldino de Oliveira");
    assert_eq!(draft.address.neighborhood, "Estados Unidos");
    assert_eq!(draft.address.city, "Uberaba");
    assert_eq!(draft.address.state, "MG");
}

#[tokio::test]
async fn test_unknown_postal_code_leaves_fields_blank() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/ws/99999999/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "erro": true })))
        .mount(&ctx.server)
        .await;

    let checkout = ctx.state.checkout();
    checkout
        .set_address(AddressForm {
            postal_code: "99999-999".to_string(),
            ..AddressForm::default()
        })
        .await
        .unwrap();
    checkout.lookup_postal_code().await.unwrap();

    assert!(checkout.draft().await.address.street.is_empty());
}

#[tokio::test]
async fn test_submit_clears_draft_and_cart() {
    let ctx = TestContext::new().await;
    ctx.mount_products().await;
    Mock::given(method("POST"))
        .and(path("/cart/checkout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "orderId": 77 })))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let cart = ctx.state.cart();
    cart.fetch_catalog().await.unwrap();
    cart.update_quantity(ProductId::new(1), 3).await.unwrap();

    let checkout = ctx.state.checkout();
    checkout.set_personal_data(valid_personal()).await.unwrap();
    checkout
        .set_delivery_method(DeliveryMethod::Pickup)
        .await
        .unwrap();
    checkout
        .set_schedule(Schedule {
            date: "21/12/2025".to_string(),
            time: "15:00".to_string(),
        })
        .await
        .unwrap();
    checkout.set_agreed_to_terms(true).await.unwrap();

    let order_id = checkout.submit().await.unwrap();
    assert_eq!(order_id, OrderId::new(77));

    // Draft gone, cart emptied, snapshot gone
    assert!(checkout.draft().await.personal.full_name.is_empty());
    assert_eq!(cart.total_quantity().await, 0);
    assert!(!ctx.state.store().contains(keys::ANON_CART).unwrap());
    assert!(!ctx.state.store().contains(keys::CHECKOUT_DRAFT).unwrap());
}

#[tokio::test]
async fn test_submit_failure_is_generic_and_keeps_draft() {
    let ctx = TestContext::new().await;
    ctx.mount_products().await;
    Mock::given(method("POST"))
        .and(path("/cart/checkout"))
        .respond_with(ResponseTemplate::new(500).set_body_string("out of stock"))
        .mount(&ctx.server)
        .await;

    let cart = ctx.state.cart();
    cart.fetch_catalog().await.unwrap();
    cart.update_quantity(ProductId::new(1), 3).await.unwrap();

    let checkout = ctx.state.checkout();
    checkout.set_personal_data(valid_personal()).await.unwrap();
    checkout
        .set_delivery_method(DeliveryMethod::Pickup)
        .await
        .unwrap();
    checkout
        .set_schedule(Schedule {
            date: "21/12/2025".to_string(),
            time: "15:00".to_string(),
        })
        .await
        .unwrap();
    checkout.set_agreed_to_terms(true).await.unwrap();

    let error = checkout.submit().await.unwrap_err();
    assert!(matches!(error, CheckoutError::Submit(_)));
    // The shopper's work survives for another attempt
    assert_eq!(checkout.draft().await.personal, valid_personal());
    assert_eq!(cart.total_quantity().await, 3);
}

#[tokio::test]
async fn test_submit_requires_terms() {
    let ctx = TestContext::new().await;
    ctx.mount_products().await;

    let cart = ctx.state.cart();
    cart.fetch_catalog().await.unwrap();
    cart.update_quantity(ProductId::new(1), 1).await.unwrap();

    let checkout = ctx.state.checkout();
    checkout.set_personal_data(valid_personal()).await.unwrap();
    checkout
        .set_delivery_method(DeliveryMethod::Pickup)
        .await
        .unwrap();
    checkout
        .set_schedule(Schedule {
            date: "21/12/2025".to_string(),
            time: "15:00".to_string(),
        })
        .await
        .unwrap();

    let error = checkout.submit().await.unwrap_err();
    assert!(matches!(error, CheckoutError::Validation(_)));
}

#[tokio::test]
async fn test_submit_rejects_empty_cart() {
    let ctx = TestContext::new().await;
    ctx.mount_products().await;
    ctx.state.cart().fetch_catalog().await.unwrap();

    let error = ctx.state.checkout().submit().await.unwrap_err();
    assert!(matches!(error, CheckoutError::EmptyCart));
}
