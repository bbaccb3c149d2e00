//! Engine services.
//!
//! Each service is an explicit value constructed once by
//! [`crate::state::AppState`] and passed around by handle.

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod lookup;
pub mod session;
