//! Session management.

use tracing::info;

/// Sign in with email and password.
///
/// # Errors
///
/// Returns an error if the credentials are rejected or the post-login
/// bootstrap fails.
pub async fn login(email: &str, password: &str) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::bootstrap().await?;
    state.cart().fetch_catalog().await?;

    let destination = state.session().login(email, password).await?;
    info!(?destination, "signed in");
    Ok(())
}

/// Sign out.
///
/// # Errors
///
/// Returns an error if local session state cannot be cleared.
pub async fn logout() -> Result<(), Box<dyn std::error::Error>> {
    let state = super::bootstrap().await?;
    state.session().logout().await?;
    info!("signed out");
    Ok(())
}

/// Show the signed-in profile.
///
/// # Errors
///
/// Returns an error if the profile cannot be fetched.
pub async fn profile() -> Result<(), Box<dyn std::error::Error>> {
    let state = super::bootstrap().await?;

    match state.session().profile().await {
        Some(profile) => {
            info!(
                "{} <{}> role={} addresses={}",
                profile.name,
                profile.email,
                profile.role,
                profile.addresses.len()
            );
        }
        None => info!("not signed in"),
    }
    Ok(())
}
