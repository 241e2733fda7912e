//! Cart synchronization library.
//!
//! Keeps a shopping cart consistent between a guest draft in local storage
//! and the cart stored on a signed-in user's record:
//!
//! - [`reducer`]: pure cart transitions (`SET_CART`, `MERGE_CART`, ...)
//! - [`hydration`]: load the guest draft and resolve its products
//! - [`auth`]: login merges the stored cart, logout clears
//! - [`persistence`]: debounced writes to local storage or the user record
//! - [`provider`]: the state owner tying it together
//!
//! Backend access goes through the [`cms`] traits; [`cms::CmsClient`]
//! implements them over HTTP.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cms;
pub mod config;
pub mod error;
pub mod hydration;
pub mod persistence;
pub mod provider;
pub mod reducer;
pub mod storage;
pub mod total;

#[cfg(test)]
mod testing;

pub use auth::{AuthState, AuthUser};
pub use config::CartConfig;
pub use error::{CartError, Result};
pub use persistence::{CartWrite, FlushOutcome, PersistenceBridge};
pub use provider::CartProvider;
pub use reducer::{CartAction, cart_reducer};
pub use total::cart_total;
