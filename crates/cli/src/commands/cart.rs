//! Cart inspection and edits.

use frozen_mango_core::ProductId;
use tracing::info;

/// Show cart contents and totals.
///
/// # Errors
///
/// Returns an error if the commerce API is unreachable.
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let state = super::bootstrap().await?;
    state.cart().fetch_catalog().await?;

    let items = state.cart().cart_items().await;
    if items.is_empty() {
        info!("cart is empty");
        return Ok(());
    }
    for entry in &items {
        info!(
            "{} x{} = R$ {:.2}",
            entry.product.name,
            entry.quantity,
            entry.product.price.line_total(entry.quantity)
        );
    }
    info!(
        "total: {} items, R$ {:.2}",
        state.cart().total_quantity().await,
        state.cart().total_price().await
    );
    Ok(())
}

/// Set the quantity of a product.
///
/// # Errors
///
/// Returns an error if the commerce API is unreachable or the sync fails.
pub async fn add(product_id: i32, quantity: i64) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::bootstrap().await?;
    state.cart().fetch_catalog().await?;

    let product_id = ProductId::new(product_id);
    state.cart().update_quantity(product_id, quantity).await?;

    // The debounced sync would outlive this process; push now instead
    if state.auth().is_authenticated().await {
        state.cart().flush().await?;
    }
    info!(
        "quantity of #{product_id} is now {:?}",
        state.cart().quantity_of(product_id).await
    );
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns an error if the commerce API is unreachable or the sync fails.
pub async fn clear() -> Result<(), Box<dyn std::error::Error>> {
    let state = super::bootstrap().await?;
    state.cart().fetch_catalog().await?;
    state.cart().empty_cart().await?;
    info!("cart emptied");
    Ok(())
}
