//! Counter-sales (operations) services.
//!
//! Staff and admins sell at the counter with a cart that never touches the
//! server: quantities and the checkout draft live only in the local store,
//! under their own keys, so an operations till survives restarts without
//! interfering with the operator's personal cart.

pub mod cart;
pub mod checkout;

pub use cart::AdminCartService;
pub use checkout::{AdminCheckoutDraft, AdminCheckoutService, AdminCustomerData, ContainerSelection};
