//! Counter-sales checkout.
//!
//! The operations till: customer data typed in by staff, manual shipping
//! fee, automatic-or-manual discount, and freezer container allocation.
//! The draft persists under [`keys::ADMIN_CHECKOUT_DRAFT`] and is cleared
//! on reset or successful submission.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use frozen_mango_core::{ContainerId, OrderId};

use crate::api::types::{
    Address, CartItemPayload, CheckoutCustomer, CheckoutRequest, DeliveryMethod, PaymentMethod,
    PaymentMode,
};
use crate::api::ApiClient;
use crate::auth::AuthClient;
use crate::services::cart::CartError;
use crate::services::checkout::{AddressForm, CheckoutError, Schedule};
use crate::services::admin::cart::AdminCartService;
use crate::storage::{LocalStore, keys};

/// How many popsicles one freezer container holds.
pub const CONTAINER_CAPACITY: u32 = 250;

/// Discount applied for offline Pix/cash payment: 10% of the subtotal.
const DISCOUNT_RATE_TENTHS: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

/// Pickup city pre-filled on the operations till.
const DEFAULT_CITY: &str = "Uberaba";
/// Pickup state pre-filled on the operations till.
const DEFAULT_STATE: &str = "MG";

/// Customer block typed in by staff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminCustomerData {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub tax_id: String,
    pub birth_date: String,
}

/// A batch of freezer containers of one color allocated to the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerSelection {
    pub color: String,
    pub quantity: u32,
    pub container_ids: Vec<ContainerId>,
}

/// The operations till draft, persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminCheckoutDraft {
    pub customer: AdminCustomerData,
    pub delivery_method: DeliveryMethod,
    pub address: AddressForm,
    pub schedule: Schedule,
    pub payment_mode: PaymentMode,
    pub payment_method: PaymentMethod,
    pub shipping_fee: Decimal,
    /// Manual discount; ignored while [`Self::auto_discount`] is on.
    pub discount: Decimal,
    pub auto_discount: bool,
    pub selected_containers: Vec<ContainerSelection>,
}

impl Default for AdminCheckoutDraft {
    fn default() -> Self {
        Self {
            customer: AdminCustomerData::default(),
            delivery_method: DeliveryMethod::Delivery,
            address: AddressForm {
                city: DEFAULT_CITY.to_string(),
                state: DEFAULT_STATE.to_string(),
                ..AddressForm::default()
            },
            schedule: Schedule::default(),
            payment_mode: PaymentMode::Offline,
            payment_method: PaymentMethod::Pix,
            shipping_fee: Decimal::ZERO,
            discount: Decimal::ZERO,
            auto_discount: true,
            selected_containers: Vec::new(),
        }
    }
}

/// Counter-sales checkout flow.
///
/// Cheaply cloneable; all clones share the draft.
#[derive(Clone)]
pub struct AdminCheckoutService {
    inner: Arc<AdminCheckoutInner>,
}

struct AdminCheckoutInner {
    cart: AdminCartService,
    api: ApiClient,
    auth: AuthClient,
    store: LocalStore,
    draft: RwLock<AdminCheckoutDraft>,
}

impl AdminCheckoutService {
    /// Create the operations checkout, restoring any persisted draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store is unreadable.
    pub fn new(
        cart: AdminCartService,
        api: ApiClient,
        auth: AuthClient,
        store: LocalStore,
    ) -> Result<Self, CheckoutError> {
        let draft: AdminCheckoutDraft = store
            .get(keys::ADMIN_CHECKOUT_DRAFT)?
            .unwrap_or_default();
        Ok(Self {
            inner: Arc::new(AdminCheckoutInner {
                cart,
                api,
                auth,
                store,
                draft: RwLock::new(draft),
            }),
        })
    }

    /// A clone of the current draft.
    pub async fn draft(&self) -> AdminCheckoutDraft {
        self.inner.draft.read().await.clone()
    }

    // =========================================================================
    // Draft mutation (each persists the draft)
    // =========================================================================

    /// Replace the customer block.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_customer(&self, customer: AdminCustomerData) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.customer = customer).await
    }

    /// Choose pickup or delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_delivery_method(&self, method: DeliveryMethod) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.delivery_method = method).await
    }

    /// Replace the delivery address.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_address(&self, address: AddressForm) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.address = address).await
    }

    /// Set the handover schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_schedule(&self, schedule: Schedule) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.schedule = schedule).await
    }

    /// Choose online or at-handover payment.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_payment_mode(&self, mode: PaymentMode) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.payment_mode = mode).await
    }

    /// Choose the payment method.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_payment_method(&self, method: PaymentMethod) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.payment_method = method).await
    }

    /// Set the manually negotiated delivery fee.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_shipping_fee(&self, fee: Decimal) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.shipping_fee = fee).await
    }

    /// Override the discount by hand; turns the automatic rule off.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_manual_discount(&self, discount: Decimal) -> Result<(), CheckoutError> {
        self.mutate(|draft| {
            draft.discount = discount;
            draft.auto_discount = false;
        })
        .await
    }

    /// Re-enable (or disable) the automatic discount rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_auto_discount(&self, auto: bool) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.auto_discount = auto).await
    }

    /// Replace the container allocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_selected_containers(
        &self,
        containers: Vec<ContainerSelection>,
    ) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.selected_containers = containers)
            .await
    }

    /// Restore defaults and drop the persisted draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store rejects the delete.
    pub async fn reset(&self) -> Result<(), CheckoutError> {
        *self.inner.draft.write().await = AdminCheckoutDraft::default();
        self.inner.store.delete(keys::ADMIN_CHECKOUT_DRAFT)?;
        Ok(())
    }

    async fn mutate(
        &self,
        apply: impl FnOnce(&mut AdminCheckoutDraft),
    ) -> Result<(), CheckoutError> {
        let mut draft = self.inner.draft.write().await;
        apply(&mut draft);
        self.inner.store.put(keys::ADMIN_CHECKOUT_DRAFT, &*draft)?;
        Ok(())
    }

    // =========================================================================
    // Derived values
    // =========================================================================

    /// The discount in effect: 10% of the subtotal for offline Pix/cash
    /// while the automatic rule is on, the manual value otherwise.
    pub async fn discount(&self) -> Decimal {
        let draft = self.inner.draft.read().await;
        if !draft.auto_discount {
            return draft.discount;
        }
        let offline_cash_like = draft.payment_mode == PaymentMode::Offline
            && matches!(draft.payment_method, PaymentMethod::Pix | PaymentMethod::Cash);
        drop(draft);
        if offline_cash_like {
            self.inner.cart.total_price().await * DISCOUNT_RATE_TENTHS
        } else {
            Decimal::ZERO
        }
    }

    /// Subtotal plus shipping fee minus discount, floored at zero.
    pub async fn grand_total(&self) -> Decimal {
        let subtotal = self.inner.cart.total_price().await;
        let draft = self.inner.draft.read().await;
        let fee = draft.shipping_fee;
        drop(draft);
        (subtotal + fee - self.discount().await).max(Decimal::ZERO)
    }

    /// How many containers the current cart needs
    /// (`ceil(total quantity / 250)`).
    pub async fn required_containers(&self) -> u32 {
        let total = self.inner.cart.total_quantity().await;
        if total == 0 {
            0
        } else {
            total.div_ceil(CONTAINER_CAPACITY)
        }
    }

    /// Whether the allocated containers cover the requirement exactly.
    pub async fn is_container_selection_complete(&self) -> bool {
        let selected: u32 = self
            .inner
            .draft
            .read()
            .await
            .selected_containers
            .iter()
            .map(|selection| selection.quantity)
            .sum();
        selected == self.required_containers().await
    }

    /// Staff-entered customer data sanity check (deliberately loose - the
    /// till must not block a sale on formatting).
    pub async fn is_customer_data_valid(&self) -> bool {
        let draft = self.inner.draft.read().await;
        draft.customer.full_name.len() > 3
            && draft.customer.phone.len() >= 10
            && draft.customer.email.len() > 3
            && draft.customer.email.contains('@')
    }

    /// Whether the handover step is complete for the chosen method.
    pub async fn is_delivery_data_valid(&self) -> bool {
        let draft = self.inner.draft.read().await;
        let has_schedule = !draft.schedule.date.is_empty() && !draft.schedule.time.is_empty();
        let has_address = !draft.address.street.is_empty()
            && !draft.address.number.is_empty()
            && !draft.address.neighborhood.is_empty();
        let delivery_method = draft.delivery_method;
        drop(draft);

        let has_containers = self.is_container_selection_complete().await;
        match delivery_method {
            DeliveryMethod::Pickup => has_schedule && has_containers,
            DeliveryMethod::Delivery => has_schedule && has_containers && has_address,
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submit the counter sale.
    ///
    /// Counter sales carry their own order lines - there is no synced
    /// server-side cart behind them - plus the allocated container ids.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any request is made,
    /// [`CartError::NotAuthenticated`] without a staff session, or a
    /// generic submit error if the API rejects the order.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> Result<OrderId, CheckoutError> {
        let items: Vec<CartItemPayload> = self
            .inner
            .cart
            .cart_items()
            .await
            .iter()
            .map(|entry| CartItemPayload {
                product_id: entry.product.id,
                quantity: entry.quantity,
            })
            .collect();
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if !self.is_customer_data_valid().await {
            return Err(crate::services::checkout::ValidationError::Invalid("customer").into());
        }
        if !self.is_delivery_data_valid().await {
            return Err(crate::services::checkout::ValidationError::Invalid("delivery").into());
        }

        let token = self
            .inner
            .auth
            .access_token()
            .await
            .ok_or(CheckoutError::Cart(CartError::NotAuthenticated))?;

        let draft = self.inner.draft.read().await.clone();
        let address = (draft.delivery_method == DeliveryMethod::Delivery).then(|| Address {
            id: None,
            postal_code: draft.address.postal_code.clone(),
            street: draft.address.street.clone(),
            number: draft.address.number.clone(),
            complement: (!draft.address.complement.is_empty())
                .then(|| draft.address.complement.clone()),
            neighborhood: draft.address.neighborhood.clone(),
            city: draft.address.city.clone(),
            state: draft.address.state.clone(),
            primary: false,
        });
        let container_ids: Vec<ContainerId> = draft
            .selected_containers
            .iter()
            .flat_map(|selection| selection.container_ids.iter().copied())
            .collect();

        let request = CheckoutRequest {
            customer: CheckoutCustomer {
                full_name: draft.customer.full_name.clone(),
                email: draft.customer.email.clone(),
                tax_id: (!draft.customer.tax_id.is_empty()).then(|| draft.customer.tax_id.clone()),
                phone: Some(draft.customer.phone.clone()),
                birth_date: (!draft.customer.birth_date.is_empty())
                    .then(|| draft.customer.birth_date.clone()),
            },
            delivery_method: draft.delivery_method,
            payment_method: draft.payment_method,
            address,
            scheduled_date: draft.schedule.date.clone(),
            scheduled_time: draft.schedule.time.clone(),
            container_ids,
            items,
        };

        let response = self
            .inner
            .api
            .checkout(Some(&token), &request)
            .await
            .map_err(CheckoutError::Submit)?;

        info!(order = %response.order_id, "counter sale submitted");
        self.reset().await?;
        self.inner.cart.empty_cart().await?;
        Ok(response.order_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use frozen_mango_core::{Price, ProductId};

    use super::*;
    use crate::api::types::Product;
    use crate::services::cart::CatalogEntry;

    fn entry(id: i32, price: &str, quantity: u32) -> CatalogEntry {
        CatalogEntry {
            product: Product {
                id: ProductId::new(id),
                name: format!("Product {id}"),
                description: String::new(),
                price: Price::new(price.parse().unwrap()).unwrap(),
                image: None,
                available: true,
                category: "Pops".to_string(),
            },
            quantity,
        }
    }

    async fn till() -> (tempfile::TempDir, AdminCartService, AdminCheckoutService) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(Some(&dir.path().join("state.redb"))).unwrap();
        let api = ApiClient::new("http://127.0.0.1:9");
        let auth = AuthClient::new(
            "http://127.0.0.1:9",
            &SecretString::from("test-key".to_owned()),
            store.clone(),
            None,
        )
        .unwrap();
        let cart = AdminCartService::new(api.clone(), store.clone());
        let checkout = AdminCheckoutService::new(cart.clone(), api, auth, store).unwrap();
        (dir, cart, checkout)
    }

    #[tokio::test]
    async fn test_required_containers_rounds_up() {
        let (_dir, cart, checkout) = till().await;
        cart.seed_catalog(vec![entry(1, "8.50", 0)]).await;

        assert_eq!(checkout.required_containers().await, 0);

        cart.update_quantity(ProductId::new(1), 250).await.unwrap();
        assert_eq!(checkout.required_containers().await, 1);

        cart.update_quantity(ProductId::new(1), 251).await.unwrap();
        assert_eq!(checkout.required_containers().await, 2);
    }

    #[tokio::test]
    async fn test_container_selection_completeness() {
        let (_dir, cart, checkout) = till().await;
        cart.seed_catalog(vec![entry(1, "8.50", 0)]).await;
        cart.update_quantity(ProductId::new(1), 300).await.unwrap();

        assert!(!checkout.is_container_selection_complete().await);

        checkout
            .set_selected_containers(vec![
                ContainerSelection {
                    color: "blue".to_string(),
                    quantity: 1,
                    container_ids: vec![ContainerId::new(4)],
                },
                ContainerSelection {
                    color: "red".to_string(),
                    quantity: 1,
                    container_ids: vec![ContainerId::new(7)],
                },
            ])
            .await
            .unwrap();
        assert!(checkout.is_container_selection_complete().await);
    }

    #[tokio::test]
    async fn test_auto_discount_rule() {
        let (_dir, cart, checkout) = till().await;
        cart.seed_catalog(vec![entry(1, "10.00", 0)]).await;
        cart.update_quantity(ProductId::new(1), 10).await.unwrap();

        // Offline + pix: 10% of 100.00
        assert_eq!(checkout.discount().await, "10.000".parse().unwrap());

        checkout
            .set_payment_method(PaymentMethod::Card)
            .await
            .unwrap();
        assert_eq!(checkout.discount().await, Decimal::ZERO);

        checkout.set_manual_discount("5.00".parse().unwrap()).await.unwrap();
        assert_eq!(checkout.discount().await, "5.00".parse().unwrap());
    }

    #[tokio::test]
    async fn test_grand_total_floors_at_zero() {
        let (_dir, cart, checkout) = till().await;
        cart.seed_catalog(vec![entry(1, "10.00", 0)]).await;
        cart.update_quantity(ProductId::new(1), 1).await.unwrap();

        checkout.set_manual_discount("50.00".parse().unwrap()).await.unwrap();
        assert_eq!(checkout.grand_total().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_draft_persists_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        {
            let store = LocalStore::open(Some(&path)).unwrap();
            let api = ApiClient::new("http://127.0.0.1:9");
            let auth = AuthClient::new(
                "http://127.0.0.1:9",
                &SecretString::from("test-key".to_owned()),
                store.clone(),
                None,
            )
            .unwrap();
            let cart = AdminCartService::new(api.clone(), store.clone());
            let checkout = AdminCheckoutService::new(cart, api, auth, store).unwrap();
            checkout
                .set_customer(AdminCustomerData {
                    full_name: "Walk-in Customer".to_string(),
                    phone: "34991234567".to_string(),
                    email: "walkin@example.com".to_string(),
                    tax_id: String::new(),
                    birth_date: String::new(),
                })
                .await
                .unwrap();
        }

        let store = LocalStore::open(Some(&path)).unwrap();
        let api = ApiClient::new("http://127.0.0.1:9");
        let auth = AuthClient::new(
            "http://127.0.0.1:9",
            &SecretString::from("test-key".to_owned()),
            store.clone(),
            None,
        )
        .unwrap();
        let cart = AdminCartService::new(api.clone(), store.clone());
        let checkout = AdminCheckoutService::new(cart, api, auth, store).unwrap();
        assert_eq!(checkout.draft().await.customer.full_name, "Walk-in Customer");

        checkout.reset().await.unwrap();
        let draft = checkout.draft().await;
        assert!(draft.customer.full_name.is_empty());
        assert_eq!(draft.address.city, DEFAULT_CITY);
        assert!(draft.auto_discount);
    }

    #[test]
    fn test_discount_rate_constant() {
        assert_eq!(DISCOUNT_RATE_TENTHS, "0.1".parse().unwrap());
    }
}
