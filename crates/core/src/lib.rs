//! Frozen Mango Core - Shared types library.
//!
//! This crate provides common types used across all Frozen Mango components:
//! - `storefront` - Storefront engine (catalog, cart, session, checkout)
//! - `cli` - Command-line harness for manual testing and operations
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no local
//! storage. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
