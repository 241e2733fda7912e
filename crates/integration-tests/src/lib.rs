//! Integration tests for cartsync.
//!
//! # Running Tests
//!
//! ```bash
//! # Scenario tests against in-memory collaborators
//! cargo test -p cartsync-integration-tests
//!
//! # Include the tests that talk to a running backend
//! CART_SERVER_URL=http://localhost:3000 cargo test -p cartsync-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `cart_lifecycle` - hydration, login merge, logout clear
//! - `persistence` - debounced writes and their destinations
//! - `cms_client` - HTTP client against a live backend (ignored by default)
//!
//! This crate exposes the in-memory backend the scenario tests share.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use cartsync::cms::{CmsError, ProductCatalog, UserCartStore};
use cartsync::storage::{CART_KEY, LocalStore, MemoryStore};
use cartsync::{AuthState, AuthUser, CartProvider};
use cartsync_core::{Cart, CartItem, PersistedCart, ProductId, ProductSnapshot, UserId};

/// Debounce window used by [`TestContext`].
pub const WINDOW: Duration = Duration::from_millis(1000);

/// In-memory stand-in for the CMS backend.
///
/// Serves a fixed product catalog and keeps one stored cart per user.
#[derive(Default)]
pub struct FakeBackend {
    products: Mutex<HashMap<ProductId, ProductSnapshot>>,
    user_carts: Mutex<HashMap<UserId, PersistedCart>>,
    persist_calls: Mutex<Vec<(UserId, PersistedCart)>>,
    fetches: AtomicUsize,
    fetch_delay: Mutex<Option<Duration>>,
    persist_delay: Mutex<Option<Duration>>,
    fail_persist: AtomicBool,
}

impl FakeBackend {
    /// Add a product priced in cents.
    pub fn add_product(&self, id: &str, title: &str, cents: i64) {
        let id = product_id(id);
        let price = format!(r#"{{"data":[{{"unit_amount":{cents}}}]}}"#);
        let mut product = ProductSnapshot::new(id.clone(), Some(price));
        product.title = Some(title.to_string());
        lock(&self.products).insert(id, product);
    }

    /// Remove a product so fetching it fails.
    pub fn remove_product(&self, id: &str) {
        lock(&self.products).remove(&product_id(id));
    }

    /// Delay every product fetch, to observe the provider mid-hydration.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *lock(&self.fetch_delay) = Some(delay);
    }

    /// Delay every remote cart write, to overlap it with later changes.
    pub fn set_persist_delay(&self, delay: Duration) {
        *lock(&self.persist_delay) = Some(delay);
    }

    /// Make every remote cart write fail (or succeed again).
    pub fn set_persist_failing(&self, failing: bool) {
        self.fail_persist.store(failing, Ordering::SeqCst);
    }

    /// Every remote cart write attempted, in order.
    pub fn persist_calls(&self) -> Vec<(UserId, PersistedCart)> {
        lock(&self.persist_calls).clone()
    }

    /// Number of product fetches served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// The cart stored on a user record.
    pub fn stored_cart(&self, user: &str) -> Option<PersistedCart> {
        lock(&self.user_carts).get(&user_id(user)).cloned()
    }

    /// Seed a user's stored cart.
    pub fn seed_user_cart(&self, user: &str, items: &[(&str, u32)]) {
        lock(&self.user_carts).insert(user_id(user), flat(items));
    }

    /// The auth state the backend would report for a signed-in user.
    pub fn login(&self, user: &str) -> AuthState {
        let stored = self.stored_cart(user).map(Cart::from).unwrap_or_default();
        AuthState::LoggedIn(AuthUser::new(user_id(user)).with_cart(stored))
    }
}

#[async_trait]
impl ProductCatalog for FakeBackend {
    async fn fetch_product(&self, id: &ProductId) -> Result<ProductSnapshot, CmsError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.fetch_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.products)
            .get(id)
            .cloned()
            .ok_or_else(|| CmsError::NotFound(format!("product {id}")))
    }
}

#[async_trait]
impl UserCartStore for FakeBackend {
    async fn persist_user_cart(
        &self,
        user: &UserId,
        cart: &PersistedCart,
    ) -> Result<(), CmsError> {
        lock(&self.persist_calls).push((user.clone(), cart.clone()));
        let delay = *lock(&self.persist_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(CmsError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        lock(&self.user_carts).insert(user.clone(), cart.clone());
        Ok(())
    }
}

/// A provider wired to a [`FakeBackend`] and an in-memory local store.
pub struct TestContext {
    pub backend: Arc<FakeBackend>,
    pub local: Arc<MemoryStore>,
    pub provider: CartProvider,
}

impl TestContext {
    /// Backend with products `p1` ($10.00), `p2` ($2.50) and `p3` ($0.99).
    #[must_use]
    pub fn new() -> Self {
        Self::with_local(MemoryStore::new())
    }

    /// Like [`TestContext::new`] with a guest draft already stored.
    #[must_use]
    pub fn with_guest_draft(items: &[(&str, u32)]) -> Self {
        let payload = serde_json::to_string(&flat(items)).unwrap_or_default();
        Self::with_local(MemoryStore::with_entry(CART_KEY, &payload))
    }

    fn with_local(local: MemoryStore) -> Self {
        let backend = Arc::new(FakeBackend::default());
        backend.add_product("p1", "Pineapple", 1000);
        backend.add_product("p2", "Mango", 250);
        backend.add_product("p3", "Lime", 99);

        let local = Arc::new(local);
        let provider = CartProvider::new(backend.clone(), backend.clone(), local.clone(), WINDOW);
        Self {
            backend,
            local,
            provider,
        }
    }

    /// A second provider sharing this context's backend and local store,
    /// as after a page reload.
    #[must_use]
    pub fn reload(&self) -> CartProvider {
        CartProvider::new(
            self.backend.clone(),
            self.backend.clone(),
            self.local.clone(),
            WINDOW,
        )
    }

    /// The guest draft in local storage, decoded.
    #[must_use]
    pub fn local_draft(&self) -> Option<PersistedCart> {
        let raw = self.local.get(CART_KEY).ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// Fetch a product from the backend for adding to the cart.
    ///
    /// # Panics
    ///
    /// Panics if the product is not in the catalog.
    pub async fn product(&self, id: &str) -> ProductSnapshot {
        match self.backend.fetch_product(&product_id(id)).await {
            Ok(product) => product,
            Err(e) => panic!("test product {id} missing: {e}"),
        }
    }

    /// Add `quantity` of a resolved product.
    pub async fn add(&self, id: &str, quantity: u32) {
        let product = self.product(id).await;
        self.provider.add_item(CartItem::new(product, quantity));
    }

    /// Let the debounce window elapse.
    pub async fn settle(&self) {
        tokio::time::sleep(WINDOW + Duration::from_millis(50)).await;
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Product id from a test literal.
///
/// # Panics
///
/// Panics on a blank id.
#[must_use]
pub fn product_id(id: &str) -> ProductId {
    match ProductId::parse(id) {
        Ok(id) => id,
        Err(e) => panic!("bad test product id {id:?}: {e}"),
    }
}

/// User id from a test literal.
///
/// # Panics
///
/// Panics on a blank id.
#[must_use]
pub fn user_id(id: &str) -> UserId {
    match UserId::parse(id) {
        Ok(id) => id,
        Err(e) => panic!("bad test user id {id:?}: {e}"),
    }
}

/// A flattened cart from `(product, quantity)` pairs.
#[must_use]
pub fn flat(items: &[(&str, u32)]) -> PersistedCart {
    Cart::from_items(
        items
            .iter()
            .map(|(id, quantity)| CartItem::new(product_id(id), *quantity)),
    )
    .flatten()
}

/// Quantities per product id, in cart order.
#[must_use]
pub fn quantities(cart: &Cart) -> Vec<(String, u32)> {
    cart.items()
        .iter()
        .map(|item| (item.product_id().to_string(), item.quantity.get()))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
