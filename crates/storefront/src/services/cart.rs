//! Cart state holder.
//!
//! Owns the product catalog and per-product quantities. Cart contents and
//! totals are always derived by filtering for positive quantities - the
//! model does not distinguish "absent" from "present with zero".
//!
//! Persistence is two-faced, gated by the presence of an access token:
//! anonymous edits write the local snapshot immediately, authenticated
//! edits schedule a debounced server sync. At most one of the two is
//! authoritative at any time.
//!
//! # Sync model
//!
//! A superseding edit *cancels* the pending sync task and schedules a new
//! one. The payload is a snapshot taken at send time, stamped with a
//! monotonic sequence number; an acknowledgement arriving for an older
//! sequence than the newest acknowledged one is discarded. Edits racing an
//! in-flight request are picked up by the next debounce cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use frozen_mango_core::ProductId;

use crate::api::types::{CartItemPayload, Product};
use crate::api::{ApiClient, ApiError};
use crate::auth::AuthClient;
use crate::storage::{LocalStore, StorageError, keys};

/// A catalog product together with its in-cart quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product: Product,
    pub quantity: u32,
}

/// Errors that can occur operating the cart.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("commerce API error: {0}")]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cart sync requires an authenticated session")]
    NotAuthenticated,
}

/// Cart state holder.
///
/// Cheaply cloneable; all clones share the same catalog and sync state.
#[derive(Clone)]
pub struct CartService {
    state: Arc<CartState>,
}

struct CartState {
    api: ApiClient,
    auth: AuthClient,
    store: LocalStore,
    catalog: RwLock<Vec<CatalogEntry>>,
    debounce: Duration,
    pending_sync: Mutex<Option<JoinHandle<()>>>,
    /// Sequence stamped on each sync send.
    sync_seq: AtomicU64,
    /// Newest acknowledged sequence; anything older is stale.
    acked_seq: AtomicU64,
    /// Set on edit, cleared when the newest sync is acknowledged.
    dirty: AtomicBool,
}

impl CartService {
    /// Create a new cart service.
    #[must_use]
    pub fn new(api: ApiClient, auth: AuthClient, store: LocalStore, debounce: Duration) -> Self {
        Self {
            state: Arc::new(CartState {
                api,
                auth,
                store,
                catalog: RwLock::new(Vec::new()),
                debounce,
                pending_sync: Mutex::new(None),
                sync_seq: AtomicU64::new(0),
                acked_seq: AtomicU64::new(0),
                dirty: AtomicBool::new(false),
            }),
        }
    }

    // =========================================================================
    // Catalog loading
    // =========================================================================

    /// Load the catalog from the commerce API, then restore prior
    /// quantities: the server cart when signed in, the local snapshot
    /// otherwise.
    ///
    /// # Errors
    ///
    /// A failed product fetch leaves the catalog empty and is returned so
    /// the shell can offer a retry. A failed server-cart fetch degrades to
    /// the local snapshot and is not an error.
    #[instrument(skip(self))]
    pub async fn fetch_catalog(&self) -> Result<(), CartError> {
        let products = match self.state.api.fetch_products().await {
            Ok(products) => products,
            Err(error) => {
                warn!(%error, "catalog fetch failed, storefront left empty");
                self.state.catalog.write().await.clear();
                return Err(error.into());
            }
        };

        {
            let mut catalog = self.state.catalog.write().await;
            *catalog = products
                .iter()
                .cloned()
                .map(|product| CatalogEntry {
                    product,
                    quantity: 0,
                })
                .collect();
        }

        if self.state.auth.access_token().await.is_some() {
            self.load_user_cart().await
        } else {
            self.apply_anon_snapshot().await
        }
    }

    /// Overwrite local quantities with the server's saved cart.
    ///
    /// Falls back to the anonymous snapshot when the server cart is
    /// unavailable - a degraded but available state.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures.
    #[instrument(skip(self))]
    pub async fn load_user_cart(&self) -> Result<(), CartError> {
        let Some(token) = self.state.auth.access_token().await else {
            return self.apply_anon_snapshot().await;
        };

        match self.state.api.fetch_cart(&token).await {
            Ok(items) => {
                let mut catalog = self.state.catalog.write().await;
                for item in items {
                    if let Some(entry) = catalog
                        .iter_mut()
                        .find(|entry| entry.product.id == item.product_id)
                    {
                        entry.quantity = item.quantity;
                    }
                }
                Ok(())
            }
            Err(error) => {
                warn!(%error, "server cart unavailable, falling back to local snapshot");
                self.apply_anon_snapshot().await
            }
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Set the quantity of a product.
    ///
    /// Negative quantities clamp to zero; unknown products are ignored.
    /// Authenticated sessions get a debounced server sync, anonymous ones
    /// an immediate snapshot write.
    ///
    /// # Errors
    ///
    /// Returns an error if the anonymous snapshot cannot be written.
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
        self.state.dirty.store(true, Ordering::SeqCst);

        if self.state.auth.access_token().await.is_some() {
            self.schedule_sync().await;
            Ok(())
        } else {
            self.write_anon_snapshot().await
        }
    }

    /// Zero every quantity, drop the anonymous snapshot, and - when signed
    /// in - push the empty cart immediately, skipping the debounce.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be cleared or the immediate
    /// sync fails.
    #[instrument(skip(self))]
    pub async fn empty_cart(&self) -> Result<(), CartError> {
        {
            let mut catalog = self.state.catalog.write().await;
            for entry in catalog.iter_mut() {
                entry.quantity = 0;
            }
        }
        self.cancel_pending_sync().await;
        self.state.store.delete(keys::ANON_CART)?;

        if self.state.auth.access_token().await.is_some() {
            sync_now(&self.state).await
        } else {
            self.state.dirty.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Cancel any pending debounce and push the current state right away.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotAuthenticated`] without a session.
    pub async fn flush(&self) -> Result<(), CartError> {
        self.cancel_pending_sync().await;
        sync_now(&self.state).await
    }

    // =========================================================================
    // Anonymous snapshot
    // =========================================================================

    /// The anonymous snapshot as sync payload lines, used by the session
    /// holder's transfer routine.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store is unreadable.
    pub fn anon_items(&self) -> Result<Vec<CartItemPayload>, CartError> {
        let snapshot: BTreeMap<ProductId, u32> = self
            .state
            .store
            .get(keys::ANON_CART)?
            .unwrap_or_default();
        Ok(snapshot
            .into_iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|(product_id, quantity)| CartItemPayload {
                product_id,
                quantity,
            })
            .collect())
    }

    /// Destructively clear the anonymous snapshot.
    ///
    /// Callers must only do this after the server has explicitly accepted
    /// the transfer.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store rejects the delete.
    pub fn clear_anon_snapshot(&self) -> Result<(), CartError> {
        self.state.store.delete(keys::ANON_CART)?;
        Ok(())
    }

    async fn write_anon_snapshot(&self) -> Result<(), CartError> {
        let snapshot: BTreeMap<ProductId, u32> = self
            .state
            .catalog
            .read()
            .await
            .iter()
            .filter(|entry| entry.quantity > 0)
            .map(|entry| (entry.product.id, entry.quantity))
            .collect();
        self.state.store.put(keys::ANON_CART, &snapshot)?;
        self.state.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn apply_anon_snapshot(&self) -> Result<(), CartError> {
        let snapshot: BTreeMap<ProductId, u32> = self
            .state
            .store
            .get(keys::ANON_CART)?
            .unwrap_or_default();
        if snapshot.is_empty() {
            return Ok(());
        }
        let mut catalog = self.state.catalog.write().await;
        for entry in catalog.iter_mut() {
            if let Some(quantity) = snapshot.get(&entry.product.id) {
                entry.quantity = *quantity;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Derivations
    // =========================================================================

    /// Every catalog entry, in catalog order.
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

    /// Whether an edit has not yet been acknowledged by the server or the
    /// local snapshot.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.dirty.load(Ordering::SeqCst)
    }

    /// Whether a debounced sync is currently scheduled.
    pub async fn has_pending_sync(&self) -> bool {
        self.state
            .pending_sync
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // =========================================================================
    // Debounced sync
    // =========================================================================

    async fn schedule_sync(&self) {
        let mut pending = self.state.pending_sync.lock().await;
        // A superseding edit cancels the scheduled task outright instead of
        // racing it to the timer.
        if let Some(stale) = pending.take() {
            stale.abort();
        }
        let state = Arc::clone(&self.state);
        let debounce = self.state.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(error) = sync_now(&state).await {
                warn!(%error, "debounced cart sync failed");
            }
        }));
    }

    async fn cancel_pending_sync(&self) {
        if let Some(stale) = self.state.pending_sync.lock().await.take() {
            stale.abort();
        }
    }

    #[cfg(test)]
    pub(crate) async fn seed_catalog(&self, entries: Vec<CatalogEntry>) {
        *self.state.catalog.write().await = entries;
    }
}

/// Push the current cart to the server.
///
/// The payload is a snapshot taken here, at send time; a stale
/// acknowledgement (older sequence than the newest acknowledged) is
/// discarded.
async fn sync_now(state: &Arc<CartState>) -> Result<(), CartError> {
    let Some(token) = state.auth.access_token().await else {
        return Err(CartError::NotAuthenticated);
    };

    let items: Vec<CartItemPayload> = state
        .catalog
        .read()
        .await
        .iter()
        .filter(|entry| entry.quantity > 0)
        .map(|entry| CartItemPayload {
            product_id: entry.product.id,
            quantity: entry.quantity,
        })
        .collect();
    let seq = state.sync_seq.fetch_add(1, Ordering::SeqCst) + 1;

    state.api.sync_cart(&token, &items).await?;

    let newest_acked = state.acked_seq.fetch_max(seq, Ordering::SeqCst).max(seq);
    if newest_acked > seq {
        debug!(seq, newest_acked, "discarding stale sync acknowledgement");
        return Ok(());
    }
    if state.sync_seq.load(Ordering::SeqCst) == seq {
        state.dirty.store(false, Ordering::SeqCst);
    }
    debug!(seq, lines = items.len(), "cart synced");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use frozen_mango_core::Price;

    use super::*;
    use crate::storage::keys;

    fn product(id: i32, name: &str, price: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            description: String::new(),
            price: Price::new(price.parse().unwrap()).unwrap(),
            image: None,
            available: true,
            category: "Milk Pops".to_string(),
        }
    }

    fn entry(id: i32, name: &str, price: &str, quantity: u32) -> CatalogEntry {
        CatalogEntry {
            product: product(id, name, price),
            quantity,
        }
    }

    async fn anonymous_service() -> (tempfile::TempDir, CartService) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(Some(&dir.path().join("state.redb"))).unwrap();
        // Unroutable endpoints: anonymous flows must never touch the network
        let api = ApiClient::new("http://127.0.0.1:9");
        let auth = AuthClient::new(
            "http://127.0.0.1:9",
            &SecretString::from("test-key".to_owned()),
            store.clone(),
            None,
        )
        .unwrap();
        let cart = CartService::new(api, auth, store, Duration::from_millis(50));
        (dir, cart)
    }

    #[tokio::test]
    async fn test_derivations_exclude_zero_quantities() {
        let (_dir, cart) = anonymous_service().await;
        cart.seed_catalog(vec![
            entry(1, "Chocolate", "2.00", 3),
            entry(2, "Strawberry", "1.50", 0),
        ])
        .await;

        let items = cart.cart_items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product.id, ProductId::new(1));
        assert_eq!(cart.total_quantity().await, 3);
        assert_eq!(cart.total_price().await, "6.00".parse().unwrap());
    }

    #[tokio::test]
    async fn test_update_quantity_clamps_negative() {
        let (_dir, cart) = anonymous_service().await;
        cart.seed_catalog(vec![entry(1, "Chocolate", "8.50", 2)]).await;

        cart.update_quantity(ProductId::new(1), -5).await.unwrap();
        assert_eq!(cart.quantity_of(ProductId::new(1)).await, Some(0));
    }

    #[tokio::test]
    async fn test_update_quantity_unknown_product_is_noop() {
        let (_dir, cart) = anonymous_service().await;
        cart.seed_catalog(vec![entry(1, "Chocolate", "8.50", 2)]).await;

        cart.update_quantity(ProductId::new(99), 4).await.unwrap();
        assert_eq!(cart.total_quantity().await, 2);
    }

    #[tokio::test]
    async fn test_anonymous_edit_writes_snapshot_immediately() {
        let (_dir, cart) = anonymous_service().await;
        cart.seed_catalog(vec![
            entry(1, "Chocolate", "8.50", 0),
            entry(2, "Strawberry", "7.00", 0),
        ])
        .await;

        cart.update_quantity(ProductId::new(2), 4).await.unwrap();

        let items = cart.anon_items().unwrap();
        assert_eq!(
            items,
            vec![CartItemPayload {
                product_id: ProductId::new(2),
                quantity: 4,
            }]
        );
        assert!(!cart.is_dirty());
    }

    #[tokio::test]
    async fn test_empty_cart_zeroes_and_clears_snapshot() {
        let (dir, cart) = anonymous_service().await;
        cart.seed_catalog(vec![
            entry(1, "Chocolate", "8.50", 2),
            entry(2, "Strawberry", "7.00", 1),
        ])
        .await;
        cart.update_quantity(ProductId::new(1), 2).await.unwrap();

        cart.empty_cart().await.unwrap();

        assert_eq!(cart.total_quantity().await, 0);
        // Release the in-memory handle before reopening: redb locks the file
        // per process, so the on-disk assertion needs exclusive access.
        drop(cart);
        let store = LocalStore::open(Some(&dir.path().join("state.redb"))).unwrap();
        assert!(!store.contains(keys::ANON_CART).unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_restores_into_fresh_catalog() {
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
            let cart = CartService::new(api, auth, store, Duration::from_millis(50));
            cart.seed_catalog(vec![entry(3, "Passion Fruit", "7.50", 0)]).await;
            cart.update_quantity(ProductId::new(3), 2).await.unwrap();
        }

        // A later session sees the snapshot applied over a zeroed catalog
        let store = LocalStore::open(Some(&path)).unwrap();
        let api = ApiClient::new("http://127.0.0.1:9");
        let auth = AuthClient::new(
            "http://127.0.0.1:9",
            &SecretString::from("test-key".to_owned()),
            store.clone(),
            None,
        )
        .unwrap();
        let cart = CartService::new(api, auth, store, Duration::from_millis(50));
        cart.seed_catalog(vec![entry(3, "Passion Fruit", "7.50", 0)]).await;
        cart.apply_anon_snapshot().await.unwrap();
        assert_eq!(cart.quantity_of(ProductId::new(3)).await, Some(2));
    }

    #[tokio::test]
    async fn test_clear_anon_snapshot_only_removes_key() {
        let (_dir, cart) = anonymous_service().await;
        cart.seed_catalog(vec![entry(1, "Chocolate", "8.50", 0)]).await;
        cart.update_quantity(ProductId::new(1), 1).await.unwrap();

        cart.clear_anon_snapshot().unwrap();
        assert!(cart.anon_items().unwrap().is_empty());
        // Catalog state is untouched by a snapshot clear
        assert_eq!(cart.quantity_of(ProductId::new(1)).await, Some(1));
    }
}
