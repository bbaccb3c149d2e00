//! Counter-sales cart.
//!
//! Same catalog and derivation rules as the customer cart, but quantities
//! persist only locally under [`keys::ADMIN_CART`] - counter sales have no
//! server-side cart and no debounce.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use frozen_mango_core::ProductId;

use crate::api::ApiClient;
use crate::services::cart::{CartError, CatalogEntry};
use crate::storage::{LocalStore, keys};

/// Counter-sales cart state holder.
///
/// Cheaply cloneable; all clones share the same catalog.
#[derive(Clone)]
pub struct AdminCartService {
    state: Arc<AdminCartState>,
}

struct AdminCartState {
    api: ApiClient,
    store: LocalStore,
    catalog: RwLock<Vec<CatalogEntry>>,
}

impl AdminCartService {
    /// Create a new counter-sales cart.
    #[must_use]
    pub fn new(api: ApiClient, store: LocalStore) -> Self {
        Self {
            state: Arc::new(AdminCartState {
                api,
                store,
                catalog: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Load the catalog and restore locally saved quantities.
    ///
    /// # Errors
    ///
    /// A failed product fetch leaves the catalog empty and is returned so
    /// the operations view can offer a retry.
    #[instrument(skip(self))]
    pub async fn fetch_catalog(&self) -> Result<(), CartError> {
        let products = match self.state.api.fetch_products().await {
            Ok(products) => products,
            Err(error) => {
                warn!(%error, "operations catalog fetch failed");
                self.state.catalog.write().await.clear();
                return Err(error.into());
            }
        };
        let saved: BTreeMap<ProductId, u32> = self
            .state
            .store
            .get(keys::ADMIN_CART)?
            .unwrap_or_default();

        let mut catalog = self.state.catalog.write().await;
        *catalog = products
            .iter()
            .cloned()
            .map(|product| {
                let quantity = saved.get(&product.id).copied().unwrap_or(0);
                CatalogEntry { product, quantity }
            })
            .collect();
        Ok(())
    }

    /// Set the quantity of a product and persist the snapshot immediately.
    ///
    /// Negative quantities clamp to zero; unknown products are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        product_id: ProductId,
        new_quantity: i64,
    ) -> Result<(), CartError> {
        let quantity = u32::try_from(new_quantity.max(0)).unwrap_or(u32::MAX);
        {
            let mut catalog = self.state.catalog.write().await;
            let Some(entry) = catalog
                .iter_mut()
                .find(|entry| entry.product.id == product_id)
            else {
                debug!(%product_id, "ignoring quantity update for unknown product");
                return Ok(());
            };
            entry.quantity = quantity;
        }
        self.write_snapshot().await
    }

    /// Zero every quantity and drop the saved snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store rejects the delete.
    #[instrument(skip(self))]
    pub async fn empty_cart(&self) -> Result<(), CartError> {
        {
            let mut catalog = self.state.catalog.write().await;
            for entry in catalog.iter_mut() {
                entry.quantity = 0;
            }
        }
        self.state.store.delete(keys::ADMIN_CART)?;
        Ok(())
    }

    /// Every catalog entry, in catalog order (availability flag included
    /// for the operations view to dim unavailable products).
    pub async fn catalog(&self) -> Vec<CatalogEntry> {
        self.state.catalog.read().await.clone()
    }

    /// Entries currently in the cart (quantity > 0).
    pub async fn cart_items(&self) -> Vec<CatalogEntry> {
        self.state
            .catalog
            .read()
            .await
            .iter()
            .filter(|entry| entry.quantity > 0)
            .cloned()
            .collect()
    }

    /// Sum of quantities across the cart.
    pub async fn total_quantity(&self) -> u32 {
        self.state
            .catalog
            .read()
            .await
            .iter()
            .map(|entry| entry.quantity)
            .sum()
    }

    /// Sum of price x quantity across the cart.
    pub async fn total_price(&self) -> Decimal {
        self.state
            .catalog
            .read()
            .await
            .iter()
            .map(|entry| entry.product.price.line_total(entry.quantity))
            .sum()
    }

    /// Quantity of a single product, if it is in the catalog.
    pub async fn quantity_of(&self, product_id: ProductId) -> Option<u32> {
        self.state
            .catalog
            .read()
            .await
            .iter()
            .find(|entry| entry.product.id == product_id)
            .map(|entry| entry.quantity)
    }

    async fn write_snapshot(&self) -> Result<(), CartError> {
        let snapshot: BTreeMap<ProductId, u32> = self
            .state
            .catalog
            .read()
            .await
            .iter()
            .filter(|entry| entry.quantity > 0)
            .map(|entry| (entry.product.id, entry.quantity))
            .collect();
        self.state.store.put(keys::ADMIN_CART, &snapshot)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn seed_catalog(&self, entries: Vec<CatalogEntry>) {
        *self.state.catalog.write().await = entries;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use frozen_mango_core::Price;

    use super::*;
    use crate::api::types::Product;

    fn entry(id: i32, price: &str, quantity: u32, available: bool) -> CatalogEntry {
        CatalogEntry {
            product: Product {
                id: ProductId::new(id),
                name: format!("Product {id}"),
                description: String::new(),
                price: Price::new(price.parse().unwrap()).unwrap(),
                image: None,
                available,
                category: "Tubs".to_string(),
            },
            quantity,
        }
    }

    fn service() -> (tempfile::TempDir, AdminCartService) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(Some(&dir.path().join("state.redb"))).unwrap();
        let api = ApiClient::new("http://127.0.0.1:9");
        (dir, AdminCartService::new(api, store))
    }

    #[tokio::test]
    async fn test_quantities_persist_locally() {
        let (_dir, cart) = service();
        cart.seed_catalog(vec![entry(1, "25.00", 0, true)]).await;

        cart.update_quantity(ProductId::new(1), 2).await.unwrap();
        let saved: BTreeMap<ProductId, u32> = cart
            .state
            .store
            .get(keys::ADMIN_CART)
            .unwrap()
            .unwrap();
        assert_eq!(saved.get(&ProductId::new(1)), Some(&2));
    }

    #[tokio::test]
    async fn test_empty_cart_drops_snapshot() {
        let (_dir, cart) = service();
        cart.seed_catalog(vec![entry(1, "25.00", 3, true)]).await;
        cart.update_quantity(ProductId::new(1), 3).await.unwrap();

        cart.empty_cart().await.unwrap();
        assert_eq!(cart.total_quantity().await, 0);
        assert!(!cart.state.store.contains(keys::ADMIN_CART).unwrap());
    }

    #[tokio::test]
    async fn test_totals_and_clamp() {
        let (_dir, cart) = service();
        cart.seed_catalog(vec![
            entry(1, "25.00", 0, true),
            entry(2, "30.00", 0, false),
        ])
        .await;

        cart.update_quantity(ProductId::new(1), 2).await.unwrap();
        cart.update_quantity(ProductId::new(2), -1).await.unwrap();

        assert_eq!(cart.total_quantity().await, 2);
        assert_eq!(cart.total_price().await, "50.00".parse().unwrap());
        assert_eq!(cart.quantity_of(ProductId::new(2)).await, Some(0));

        // Unavailable products stay listed; dimming them is the view's job
        let catalog = cart.catalog().await;
        assert_eq!(catalog.len(), 2);
        assert!(!catalog[1].product.available);
    }
}
