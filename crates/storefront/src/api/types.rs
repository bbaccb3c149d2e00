//! Commerce API types.
//!
//! Wire representations for the remote commerce API. Field names follow the
//! API's camelCase JSON; money travels as decimal strings and is parsed
//! into [`Price`]/[`Decimal`] at the boundary.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use frozen_mango_core::{AddressId, ContainerId, Email, Price, ProductId, Role};

// =============================================================================
// Catalog
// =============================================================================

/// A catalog product as returned by `GET /products`.
///
/// Immutable once fetched within a session; quantities live next to the
/// product in the cart service, never inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Unit price; non-negative by construction.
    pub price: Price,
    /// Cover image reference, if any.
    pub image: Option<String>,
    /// Whether the product is currently offered for sale.
    pub available: bool,
    /// Category display name.
    pub category: String,
}

// =============================================================================
// Cart
// =============================================================================

/// One cart line on the wire: `{ "productId": ..., "quantity": ... }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemPayload {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of `PUT /cart/sync` and `POST /cart/transfer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItemsBody {
    pub items: Vec<CartItemPayload>,
}

// =============================================================================
// Profile
// =============================================================================

/// A saved delivery address on the user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AddressId>,
    pub postal_code: String,
    pub street: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    /// Whether this is the profile's primary address.
    #[serde(default)]
    pub primary: bool,
}

/// User profile as served by `GET /users/profile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(rename = "userId")]
    pub id: Uuid,
    pub name: String,
    pub email: Email,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    pub role: Role,
    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl Profile {
    /// First word of the display name, used as the greeting.
    #[must_use]
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// Envelope around the profile: `{ "user": { ... } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileEnvelope {
    pub user: Profile,
}

/// Body of `PUT /users/profile`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,
}

// =============================================================================
// Shipping
// =============================================================================

/// Body of `POST /shipping/calculate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRequest {
    pub postal_code: String,
    pub street: String,
    pub number: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

/// Response of `POST /shipping/calculate`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ShippingQuote {
    /// Delivery fee in currency units.
    pub fee: Decimal,
    /// Distance to the delivery address, in kilometers.
    pub distance: Decimal,
}

// =============================================================================
// Checkout
// =============================================================================

/// How the order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Pickup,
    Delivery,
}

/// How the order is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Pix,
    Cash,
    Card,
}

/// Whether payment happens online or at handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Online,
    #[default]
    Offline,
}

/// Customer block of a checkout submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutCustomer {
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
}

/// Body of `POST /cart/checkout`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer: CheckoutCustomer,
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub scheduled_date: String,
    pub scheduled_time: String,
    /// Freezer container ids fulfilling the order (counter sales only).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub container_ids: Vec<ContainerId>,
    /// Order lines; present when the order is not backed by a synced
    /// server-side cart (counter sales).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub items: Vec<CartItemPayload>,
}

/// Response of `POST /cart/checkout`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: frozen_mango_core::OrderId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_wire_shape() {
        let json = r#"{
            "id": 3,
            "name": "Truffled Milk",
            "description": "Milk base with a chocolate truffle core.",
            "price": "9.00",
            "image": "cards/truffled-milk.png",
            "available": true,
            "category": "Milk Pops"
        }"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.id, ProductId::new(3));
        assert_eq!(product.price.amount(), "9.00".parse().unwrap());
        assert!(product.available);
    }

    #[test]
    fn test_cart_item_payload_camel_case() {
        let item = CartItemPayload {
            product_id: ProductId::new(7),
            quantity: 2,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["productId"], 7);
        assert_eq!(json["quantity"], 2);
    }

    #[test]
    fn test_profile_envelope() {
        let json = r#"{
            "user": {
                "userId": "6a3bd7f2-8a47-4df2-9a41-02f7f0a1ce0f",
                "name": "Ana Clara Souza",
                "email": "ana@example.com",
                "role": "CUSTOMER",
                "phone": null,
                "addresses": []
            }
        }"#;
        let envelope: ProfileEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.user.first_name(), "Ana");
        assert_eq!(envelope.user.role, Role::Customer);
        assert!(envelope.user.birth_date.is_none());
    }

    #[test]
    fn test_checkout_request_omits_empty_collections() {
        let request = CheckoutRequest {
            customer: CheckoutCustomer {
                full_name: "Ana Clara Souza".to_string(),
                email: "ana@example.com".to_string(),
                tax_id: None,
                phone: None,
                birth_date: None,
            },
            delivery_method: DeliveryMethod::Pickup,
            payment_method: PaymentMethod::Pix,
            address: None,
            scheduled_date: "21/12/2025".to_string(),
            scheduled_time: "15:00".to_string(),
            container_ids: Vec::new(),
            items: Vec::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("containerIds").is_none());
        assert!(json.get("items").is_none());
        assert_eq!(json["deliveryMethod"], "pickup");
    }
}
