//! CLI command implementations.

pub mod cart;
pub mod catalog;
pub mod session;

use frozen_mango_storefront::config::StorefrontConfig;
use frozen_mango_storefront::state::AppState;

/// Build the engine from the environment, restoring any persisted session.
pub async fn bootstrap() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = StorefrontConfig::from_env()?;
    let state = AppState::new(config)?;
    state.session().initialize(None).await?;
    tracing::debug!(api_url = %state.config().api_url, "engine ready");
    Ok(state)
}
