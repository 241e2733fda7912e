//! Cart commands.
//!
//! Every command runs inside a [`Session`]: the provider is built over the
//! configured backend and the local draft directory, hydrated, and told who
//! is signed in. Pending persistence is flushed when the session closes.
//!
//! # Environment Variables
//!
//! - `CART_SERVER_URL` - Backend base URL
//! - `CART_API_TOKEN` - Signed-in user's token; without it the cart is a guest cart
//! - `CART_STORAGE_DIR` - Where the guest cart draft is kept

use std::fmt::Write as _;
use std::sync::Arc;

use thiserror::Error;

use cartsync::cms::{CmsClient, CmsError, ProductCatalog};
use cartsync::storage::FileStore;
use cartsync::{AuthState, CartConfig, CartProvider, FlushOutcome};
use cartsync_core::{Cart, CartItem, CartTotal, IdError, ProductId};

/// Errors that can occur while running a cart command.
#[derive(Debug, Error)]
pub enum CartCommandError {
    /// Product id argument is blank.
    #[error("Invalid product id: {0}")]
    InvalidProduct(#[from] IdError),

    /// Backend request failed.
    #[error("Backend error: {0}")]
    Cms(#[from] CmsError),
}

/// A hydrated provider with auth resolved.
pub struct Session {
    client: CmsClient,
    provider: CartProvider,
}

impl Session {
    /// Build the provider, hydrate it and resolve the signed-in user.
    ///
    /// Hydration and the user lookup run concurrently; the provider applies
    /// the login only after the local cart is in place.
    ///
    /// # Errors
    ///
    /// Returns `CartCommandError::Cms` if the client cannot be built or the
    /// user lookup fails.
    pub async fn open(config: &CartConfig) -> Result<Self, CartCommandError> {
        let client = CmsClient::new(&config.server)?;
        let local = Arc::new(FileStore::new(config.storage_dir.clone()));
        let provider = CartProvider::new(
            Arc::new(client.clone()),
            Arc::new(client.clone()),
            local,
            config.debounce,
        );

        let (user, ()) = tokio::join!(
            async {
                let user = client.current_user().await;
                if let Ok(user) = &user {
                    provider.set_auth(AuthState::from(user.clone()));
                }
                user
            },
            provider.hydrate()
        );
        user?;

        tracing::info!(
            auth = %provider.auth_status(),
            items = provider.cart().len(),
            "Cart session ready"
        );
        Ok(Self { client, provider })
    }

    /// Fetch a product and add it to the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartCommandError` if the id is blank or the product cannot be
    /// fetched.
    pub async fn add(&self, product: &str, quantity: u32) -> Result<(), CartCommandError> {
        let id = ProductId::parse(product)?;
        let snapshot = self.client.fetch_product(&id).await?;
        self.provider.add_item(CartItem::new(snapshot, quantity));
        Ok(())
    }

    /// Remove a product. Returns whether it was in the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartCommandError::InvalidProduct` if the id is blank.
    pub fn remove(&self, product: &str) -> Result<bool, CartCommandError> {
        let id = ProductId::parse(product)?;
        let present = self.provider.is_product_in_cart(&id);
        self.provider.delete_item(&id);
        Ok(present)
    }

    /// Empty the cart.
    pub fn clear(&self) {
        self.provider.clear_cart();
    }

    /// Current cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.provider.cart()
    }

    /// Current total.
    #[must_use]
    pub fn total(&self) -> CartTotal {
        self.provider.cart_total()
    }

    /// Flush pending persistence.
    pub async fn close(self) -> Option<FlushOutcome> {
        let outcome = self.provider.flush().await;
        if outcome == Some(FlushOutcome::Failed) {
            tracing::warn!("Cart changes were not saved");
        }
        outcome
    }
}

/// Render the cart as a table of lines followed by the total.
#[must_use]
pub fn render(cart: &Cart, total: &CartTotal) -> String {
    if cart.is_empty() {
        return format!("Cart is empty\nTotal: {}\n", total.formatted);
    }

    let mut out = String::new();
    for item in cart.items() {
        let quantity = item.quantity.get();
        let (name, line) = item.product.as_snapshot().map_or_else(
            || (item.product_id().to_string(), "-".to_string()),
            |product| {
                (
                    product
                        .title
                        .clone()
                        .unwrap_or_else(|| product.id.to_string()),
                    product.unit_amount().times(quantity).display(),
                )
            },
        );
        let _ = writeln!(out, "{quantity:>4} x {name:<40} {line:>12}");
    }
    let _ = writeln!(out, "Total: {}", total.formatted);
    out
}
