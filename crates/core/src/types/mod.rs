//! Core types for cartsync.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;
pub mod quantity;
pub mod status;

pub use cart::{Cart, CartItem, PersistedCart, PersistedItem, ProductRef};
pub use id::*;
pub use price::{CartTotal, Money};
pub use product::ProductSnapshot;
pub use quantity::Quantity;
pub use status::*;
