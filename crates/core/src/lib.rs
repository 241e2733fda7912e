//! Cartsync Core - Shared types library.
//!
//! This crate provides the cart data model used across all cartsync components:
//! - `cartsync` - Cart synchronization engine (reducer, persistence, hydration)
//! - `cartsync-cli` - Command-line driver for a live storefront backend
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no HTTP
//! clients, no timers. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, quantities, money, products and carts

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
