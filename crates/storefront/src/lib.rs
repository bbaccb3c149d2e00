//! Frozen Mango storefront engine.
//!
//! This crate is the state core of the Frozen Mango shop clients (kiosk and
//! desktop shells): it owns catalog and cart state, identity and session
//! state, and checkout drafts, and keeps them synchronized with the remote
//! commerce API and the external auth provider.
//!
//! # Architecture
//!
//! - [`state::AppState`] wires every service together once; shells hold it
//!   by handle. There are no global singletons.
//! - [`services::cart::CartService`] owns the catalog and per-product
//!   quantities, persists the anonymous snapshot locally, and syncs the
//!   authenticated cart with debounced writes.
//! - [`services::session::SessionService`] owns authentication state and the
//!   profile, and drives the anonymous-to-authenticated cart transfer.
//! - [`auth::AuthClient`] is the boundary to the external auth provider;
//!   state changes arrive on a typed broadcast channel.
//! - [`storage::LocalStore`] is the embedded key-value store playing the
//!   role browser local storage plays for the web shell.
//!
//! Rendering and navigation stay in the shells; the engine returns
//! decisions (e.g. [`services::session::Destination`]) instead of acting on
//! them.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod storage;
