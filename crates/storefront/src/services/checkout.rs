//! Customer checkout.
//!
//! Holds the checkout draft (personal data, address, schedule, payment),
//! validates it with the same field formats the shop has always used,
//! quotes the delivery fee, and submits the order. The draft is persisted
//! under [`keys::CHECKOUT_DRAFT`] so an interrupted checkout survives a
//! restart, and is cleared on reset or successful submission.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

use frozen_mango_core::{Email, OrderId};

use crate::api::types::{
    Address, CheckoutCustomer, CheckoutRequest, DeliveryMethod, PaymentMethod, ShippingRequest,
};
use crate::api::{ApiClient, ApiError};
use crate::auth::AuthClient;
use crate::services::cart::{CartError, CartService};
use crate::services::lookup::PostalLookupClient;
use crate::storage::{LocalStore, StorageError, keys};

/// Discount applied for Pix/cash payment: 10% of the cart subtotal.
static DISCOUNT_RATE: LazyLock<Decimal> = LazyLock::new(|| Decimal::new(1, 1));

static TAX_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}\.\d{3}\.\d{3}-\d{2}$").expect("valid regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d{2}\) \d{5}-\d{4}$").expect("valid regex"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("valid regex"));
static POSTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}-\d{3}$").expect("valid regex"));

// =============================================================================
// Draft types
// =============================================================================

/// Customer identification step of the draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalData {
    pub full_name: String,
    pub email: String,
    /// Masked tax id (`###.###.###-##`).
    pub tax_id: String,
    /// Masked phone (`(##) #####-####`).
    pub phone: String,
    /// Masked date (`dd/mm/yyyy`).
    pub birth_date: String,
}

/// Address form fields, masked the way the UI collects them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressForm {
    /// Masked postal code (`#####-###`).
    pub postal_code: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

impl AddressForm {
    fn to_address(&self) -> Address {
        Address {
            id: None,
            postal_code: self.postal_code.clone(),
            street: self.street.clone(),
            number: self.number.clone(),
            complement: (!self.complement.is_empty()).then(|| self.complement.clone()),
            neighborhood: self.neighborhood.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            primary: false,
        }
    }
}

/// Requested handover date and time, as entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub date: String,
    pub time: String,
}

impl Schedule {
    fn is_set(&self) -> bool {
        !self.date.is_empty() && !self.time.is_empty()
    }
}

/// The whole checkout draft, persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutDraft {
    pub personal: PersonalData,
    pub address: AddressForm,
    pub delivery_address: AddressForm,
    pub use_same_address: bool,
    pub delivery_method: Option<DeliveryMethod>,
    pub schedule: Schedule,
    pub payment_method: PaymentMethod,
    pub agreed_to_terms: bool,
}

impl Default for CheckoutDraft {
    fn default() -> Self {
        Self {
            personal: PersonalData::default(),
            address: AddressForm::default(),
            delivery_address: AddressForm::default(),
            use_same_address: true,
            delivery_method: None,
            schedule: Schedule::default(),
            payment_method: PaymentMethod::Pix,
            agreed_to_terms: false,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A field failing its schema check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("{0} is invalid")]
    Invalid(&'static str),
    #[error("delivery method must be chosen")]
    MissingDeliveryMethod,
    #[error("terms must be accepted")]
    TermsNotAccepted,
}

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cart is empty")]
    EmptyCart,
    /// Deliberately generic: the shell surfaces this as "try again".
    #[error("checkout could not be completed")]
    Submit(#[source] ApiError),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// =============================================================================
// Validation
// =============================================================================

/// Validate the customer identification step.
///
/// # Errors
///
/// Returns the first failing field.
pub fn validate_personal(data: &PersonalData) -> Result<(), ValidationError> {
    if data.full_name.trim().len() < 3 {
        return Err(if data.full_name.trim().is_empty() {
            ValidationError::Required("name")
        } else {
            ValidationError::Invalid("name")
        });
    }
    if data.email.is_empty() {
        return Err(ValidationError::Required("email"));
    }
    if Email::parse(&data.email).is_err() {
        return Err(ValidationError::Invalid("email"));
    }
    if data.tax_id.is_empty() {
        return Err(ValidationError::Required("tax id"));
    }
    if !TAX_ID_RE.is_match(&data.tax_id) {
        return Err(ValidationError::Invalid("tax id"));
    }
    if data.phone.is_empty() {
        return Err(ValidationError::Required("phone"));
    }
    if !PHONE_RE.is_match(&data.phone) {
        return Err(ValidationError::Invalid("phone"));
    }
    if data.birth_date.is_empty() {
        return Err(ValidationError::Required("birth date"));
    }
    if !DATE_RE.is_match(&data.birth_date) {
        return Err(ValidationError::Invalid("birth date"));
    }
    Ok(())
}

/// Validate the address form.
///
/// # Errors
///
/// Returns the first failing field.
pub fn validate_address(address: &AddressForm) -> Result<(), ValidationError> {
    if address.postal_code.is_empty() {
        return Err(ValidationError::Required("postal code"));
    }
    if !POSTAL_RE.is_match(&address.postal_code) {
        return Err(ValidationError::Invalid("postal code"));
    }
    if address.street.is_empty() {
        return Err(ValidationError::Required("street"));
    }
    if address.number.is_empty() {
        return Err(ValidationError::Required("number"));
    }
    if address.neighborhood.is_empty() {
        return Err(ValidationError::Required("neighborhood"));
    }
    Ok(())
}

// =============================================================================
// CheckoutService
// =============================================================================

/// Customer checkout flow.
///
/// Cheaply cloneable; all clones share the draft.
#[derive(Clone)]
pub struct CheckoutService {
    inner: Arc<CheckoutInner>,
}

struct CheckoutInner {
    cart: CartService,
    api: ApiClient,
    auth: AuthClient,
    lookup: PostalLookupClient,
    store: LocalStore,
    draft: RwLock<CheckoutDraft>,
    /// Last delivery fee quoted by the shipping service.
    quoted_fee: RwLock<Option<Decimal>>,
    default_fee: Decimal,
}

impl CheckoutService {
    /// Create the checkout service, restoring any persisted draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store is unreadable.
    pub fn new(
        cart: CartService,
        api: ApiClient,
        auth: AuthClient,
        lookup: PostalLookupClient,
        store: LocalStore,
        default_fee: Decimal,
    ) -> Result<Self, CheckoutError> {
        let draft: CheckoutDraft = store.get(keys::CHECKOUT_DRAFT)?.unwrap_or_default();
        Ok(Self {
            inner: Arc::new(CheckoutInner {
                cart,
                api,
                auth,
                lookup,
                store,
                draft: RwLock::new(draft),
                quoted_fee: RwLock::new(None),
                default_fee,
            }),
        })
    }

    /// A clone of the current draft.
    pub async fn draft(&self) -> CheckoutDraft {
        self.inner.draft.read().await.clone()
    }

    // =========================================================================
    // Draft mutation (each persists the draft)
    // =========================================================================

    /// Replace the personal data step.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_personal_data(&self, personal: PersonalData) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.personal = personal).await
    }

    /// Replace the address form.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_address(&self, address: AddressForm) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.address = address).await
    }

    /// Replace the separate delivery address.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_delivery_address(&self, address: AddressForm) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.delivery_address = address).await
    }

    /// Toggle delivering to the billing address.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_use_same_address(&self, same: bool) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.use_same_address = same).await
    }

    /// Choose pickup or delivery. Changing the method resets the payment
    /// method to Pix, matching the shop's long-standing behavior.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_delivery_method(&self, method: DeliveryMethod) -> Result<(), CheckoutError> {
        self.mutate(|draft| {
            draft.delivery_method = Some(method);
            draft.payment_method = PaymentMethod::Pix;
        })
        .await
    }

    /// Set the requested handover date and time.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_schedule(&self, schedule: Schedule) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.schedule = schedule).await
    }

    /// Choose the payment method.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_payment_method(&self, method: PaymentMethod) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.payment_method = method).await
    }

    /// Record acceptance of the terms.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft cannot be persisted.
    pub async fn set_agreed_to_terms(&self, agreed: bool) -> Result<(), CheckoutError> {
        self.mutate(|draft| draft.agreed_to_terms = agreed).await
    }

    /// Discard the draft and its persisted copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store rejects the delete.
    pub async fn reset(&self) -> Result<(), CheckoutError> {
        *self.inner.draft.write().await = CheckoutDraft::default();
        *self.inner.quoted_fee.write().await = None;
        self.inner.store.delete(keys::CHECKOUT_DRAFT)?;
        Ok(())
    }

    async fn mutate(&self, apply: impl FnOnce(&mut CheckoutDraft)) -> Result<(), CheckoutError> {
        let mut draft = self.inner.draft.write().await;
        apply(&mut draft);
        self.inner.store.put(keys::CHECKOUT_DRAFT, &*draft)?;
        Ok(())
    }

    // =========================================================================
    // Step completion & totals
    // =========================================================================

    /// Whether the personal data step passes its schema.
    pub async fn is_personal_data_complete(&self) -> bool {
        validate_personal(&self.inner.draft.read().await.personal).is_ok()
    }

    /// Whether the address step passes its schema and a schedule is set.
    pub async fn is_address_step_complete(&self) -> bool {
        let draft = self.inner.draft.read().await;
        validate_address(&draft.address).is_ok() && draft.schedule.is_set()
    }

    /// Whether a delivery fee applies.
    pub async fn shows_delivery_fee(&self) -> bool {
        self.inner.draft.read().await.delivery_method == Some(DeliveryMethod::Delivery)
    }

    /// Whether the Pix/cash discount applies.
    pub async fn shows_discount(&self) -> bool {
        let method = self.inner.draft.read().await.payment_method;
        matches!(method, PaymentMethod::Pix | PaymentMethod::Cash)
            && self.is_address_step_complete().await
    }

    /// The delivery fee currently in effect: the quoted fee for delivery
    /// orders (or the configured default before a quote lands), zero for
    /// pickup.
    pub async fn delivery_fee(&self) -> Decimal {
        if !self.shows_delivery_fee().await {
            return Decimal::ZERO;
        }
        self.inner
            .quoted_fee
            .read()
            .await
            .unwrap_or(self.inner.default_fee)
    }

    /// The discount currently in effect.
    pub async fn discount(&self) -> Decimal {
        if self.shows_discount().await {
            self.inner.cart.total_price().await * *DISCOUNT_RATE
        } else {
            Decimal::ZERO
        }
    }

    /// Cart subtotal plus delivery fee minus discount, floored at zero.
    pub async fn grand_total(&self) -> Decimal {
        let subtotal = self.inner.cart.total_price().await;
        let total = subtotal + self.delivery_fee().await - self.discount().await;
        total.max(Decimal::ZERO)
    }

    // =========================================================================
    // Remote interactions
    // =========================================================================

    /// Ask the shipping service for a delivery fee quote.
    ///
    /// Unreachable or failing shipping service degrades to the configured
    /// default fee instead of blocking checkout.
    #[instrument(skip(self))]
    pub async fn refresh_shipping_quote(&self) -> Decimal {
        let draft = self.inner.draft.read().await;
        if draft.delivery_method != Some(DeliveryMethod::Delivery) {
            drop(draft);
            *self.inner.quoted_fee.write().await = None;
            return Decimal::ZERO;
        }
        let address = if draft.use_same_address {
            draft.address.clone()
        } else {
            draft.delivery_address.clone()
        };
        drop(draft);

        let request = ShippingRequest {
            postal_code: address.postal_code,
            street: address.street,
            number: address.number,
            neighborhood: address.neighborhood,
            city: address.city,
            state: address.state,
        };
        let fee = match self.inner.api.calculate_shipping(&request).await {
            Ok(quote) => quote.fee,
            Err(error) => {
                warn!(%error, "shipping quote unavailable, assuming default fee");
                self.inner.default_fee
            }
        };
        *self.inner.quoted_fee.write().await = Some(fee);
        fee
    }

    /// Autofill the address form from its postal code, best-effort.
    ///
    /// A failed lookup leaves the fields untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated draft cannot be persisted.
    pub async fn lookup_postal_code(&self) -> Result<(), CheckoutError> {
        let postal_code = self.inner.draft.read().await.address.postal_code.clone();
        let Some(found) = self.inner.lookup.lookup(&postal_code).await else {
            return Ok(());
        };
        self.mutate(|draft| {
            draft.address.street = found.street;
            draft.address.neighborhood = found.neighborhood;
            draft.address.city = found.city;
            draft.address.state = found.state;
        })
        .await
    }

    /// Validate the draft and submit the order.
    ///
    /// On success the draft is discarded and the cart emptied. Failure is
    /// surfaced as a deliberately generic [`CheckoutError::Submit`].
    ///
    /// # Errors
    ///
    /// Returns a validation error before any request is made, or
    /// [`CheckoutError::Submit`] if the API rejects the order.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> Result<OrderId, CheckoutError> {
        if self.inner.cart.cart_items().await.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let draft = self.inner.draft.read().await.clone();
        validate_personal(&draft.personal)?;
        let Some(delivery_method) = draft.delivery_method else {
            return Err(ValidationError::MissingDeliveryMethod.into());
        };
        if !draft.schedule.is_set() {
            return Err(ValidationError::Required("schedule").into());
        }
        if delivery_method == DeliveryMethod::Delivery {
            let address = if draft.use_same_address {
                &draft.address
            } else {
                &draft.delivery_address
            };
            validate_address(address)?;
        }
        if !draft.agreed_to_terms {
            return Err(ValidationError::TermsNotAccepted.into());
        }

        let address = (delivery_method == DeliveryMethod::Delivery).then(|| {
            if draft.use_same_address {
                draft.address.to_address()
            } else {
                draft.delivery_address.to_address()
            }
        });
        let request = CheckoutRequest {
            customer: CheckoutCustomer {
                full_name: draft.personal.full_name.clone(),
                email: draft.personal.email.clone(),
                tax_id: Some(draft.personal.tax_id.clone()),
                phone: Some(draft.personal.phone.clone()),
                birth_date: Some(draft.personal.birth_date.clone()),
            },
            delivery_method,
            payment_method: draft.payment_method,
            address,
            scheduled_date: draft.schedule.date.clone(),
            scheduled_time: draft.schedule.time.clone(),
            container_ids: Vec::new(),
            items: Vec::new(),
        };

        let token = self.inner.auth.access_token().await;
        let response = self
            .inner
            .api
            .checkout(token.as_ref(), &request)
            .await
            .map_err(CheckoutError::Submit)?;

        self.reset().await?;
        self.inner.cart.empty_cart().await?;
        Ok(response.order_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

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

    #[test]
    fn test_validate_personal_accepts_masked_formats() {
        assert!(validate_personal(&valid_personal()).is_ok());
    }

    #[test]
    fn test_validate_personal_rejects_bad_fields() {
        let mut short_name = valid_personal();
        short_name.full_name = "Al".to_string();
        assert_eq!(
            validate_personal(&short_name),
            Err(ValidationError::Invalid("name"))
        );

        let mut bare_tax_id = valid_personal();
        bare_tax_id.tax_id = "12345678909".to_string();
        assert_eq!(
            validate_personal(&bare_tax_id),
            Err(ValidationError::Invalid("tax id"))
        );

        let mut bad_phone = valid_personal();
        bad_phone.phone = "34 99123-4567".to_string();
        assert_eq!(
            validate_personal(&bad_phone),
            Err(ValidationError::Invalid("phone"))
        );

        let mut iso_date = valid_personal();
        iso_date.birth_date = "1994-03-21".to_string();
        assert_eq!(
            validate_personal(&iso_date),
            Err(ValidationError::Invalid("birth date"))
        );

        let mut missing_email = valid_personal();
        missing_email.email = String::new();
        assert_eq!(
            validate_personal(&missing_email),
            Err(ValidationError::Required("email"))
        );
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address(&valid_address()).is_ok());

        let mut bare_postal = valid_address();
        bare_postal.postal_code = "38400100".to_string();
        assert_eq!(
            validate_address(&bare_postal),
            Err(ValidationError::Invalid("postal code"))
        );

        let mut no_number = valid_address();
        no_number.number = String::new();
        assert_eq!(
            validate_address(&no_number),
            Err(ValidationError::Required("number"))
        );
    }

    #[test]
    fn test_draft_default_uses_same_address_and_pix() {
        let draft = CheckoutDraft::default();
        assert!(draft.use_same_address);
        assert_eq!(draft.payment_method, PaymentMethod::Pix);
        assert!(draft.delivery_method.is_none());
        assert!(!draft.agreed_to_terms);
    }

    #[test]
    fn test_address_form_to_address_drops_empty_complement() {
        let address = valid_address().to_address();
        assert!(address.complement.is_none());

        let mut with_complement = valid_address();
        with_complement.complement = "Apt 12".to_string();
        assert_eq!(
            with_complement.to_address().complement.as_deref(),
            Some("Apt 12")
        );
    }
}
