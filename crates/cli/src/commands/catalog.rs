//! Catalog listing.

use tracing::info;

/// Fetch and list the product catalog.
///
/// # Errors
///
/// Returns an error if the commerce API is unreachable.
pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let state = super::bootstrap().await?;
    state.cart().fetch_catalog().await?;

    for entry in state.cart().catalog().await {
        let product = &entry.product;
        let availability = if product.available { "" } else { " (unavailable)" };
        info!(
            "#{} {} - {} [{}]{}",
            product.id, product.name, product.price, product.category, availability
        );
    }
    Ok(())
}
