//! CMS backend collaborators: product catalog and user cart record.
//!
//! # Architecture
//!
//! The cart core only ever talks to the backend through two narrow traits:
//!
//! - [`ProductCatalog`] - "fetch product by id", used by hydration
//! - [`UserCartStore`] - "persist cart for user", used by the persistence bridge
//!
//! [`CmsClient`] implements both over HTTP with `reqwest`, and also exposes
//! the signed-in user (`/api/users/me`) which the CLI uses as its auth source.
//! Product snapshots are cached in memory via `moka`.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartsync::cms::{CmsClient, ProductCatalog};
//!
//! let client = CmsClient::new(&config.server)?;
//! let product = client.fetch_product(&ProductId::parse("64f0c2")?).await?;
//! println!("{}", product.unit_amount());
//! ```

mod client;

pub use client::CmsClient;

use async_trait::async_trait;
use thiserror::Error;

use cartsync_core::{PersistedCart, ProductId, ProductSnapshot, UserId};

/// Errors that can occur when interacting with the CMS backend.
#[derive(Debug, Error)]
pub enum CmsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Request requires a signed-in user.
    #[error("Unauthorized")]
    Unauthorized,

    /// The configured base URL cannot carry a path.
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

/// "Fetch product by id".
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Resolve a product id to its full snapshot.
    ///
    /// # Errors
    ///
    /// Returns `CmsError::NotFound` if the product does not exist, or another
    /// `CmsError` if the lookup fails.
    async fn fetch_product(&self, id: &ProductId) -> Result<ProductSnapshot, CmsError>;
}

/// "Persist cart for user".
#[async_trait]
pub trait UserCartStore: Send + Sync {
    /// Replace the cart field of a user record with a flattened cart.
    ///
    /// Must be idempotent: the bridge may send the same payload again.
    ///
    /// # Errors
    ///
    /// Returns `CmsError` if the update is rejected or fails in transit.
    async fn persist_user_cart(&self, user: &UserId, cart: &PersistedCart)
    -> Result<(), CmsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cms_error_display() {
        let err = CmsError::NotFound("product 64f0".to_string());
        assert_eq!(err.to_string(), "Not found: product 64f0");

        let err = CmsError::Api {
            status: 403,
            message: "forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 403 - forbidden");
    }

    #[test]
    fn test_rate_limited_error() {
        let err = CmsError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }
}
