//! The cart provider: owns cart state and wires it to hydration, auth and
//! persistence.
//!
//! # Lifecycle
//!
//! 1. [`CartProvider::new`] starts `Uninitialized` with an empty cart.
//! 2. [`CartProvider::hydrate`] loads the guest cart from local storage,
//!    resolves its products and replaces the cart (`SET_CART`).
//! 3. [`CartProvider::set_auth`] reports the signed-in user. Before hydration
//!    completes the state is only recorded; afterwards a login merges the
//!    user's stored cart and a logout clears the cart.
//! 4. Once hydrated with a known auth state, every change schedules a
//!    debounced write through the [`PersistenceBridge`].
//!
//! Mutations and queries are synchronous and never fail. State lives behind a
//! `std::sync::Mutex` that is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, instrument};

use cartsync_core::{AuthStatus, Cart, CartItem, CartTotal, ProductId, SyncPhase};

use crate::auth::{AuthState, transition};
use crate::cms::{ProductCatalog, UserCartStore};
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::hydration::{load_local_cart, resolve_items};
use crate::persistence::{CartWrite, FlushOutcome, PersistenceBridge};
use crate::reducer::{CartAction, cart_reducer};
use crate::storage::LocalStore;
use crate::total::cart_total;

/// Cart state owner.
///
/// Cheaply cloneable; clones share state. Mutating methods schedule
/// persistence with `tokio::spawn` and must be called within a tokio runtime.
#[derive(Clone)]
pub struct CartProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    catalog: Arc<dyn ProductCatalog>,
    local: Arc<dyn LocalStore>,
    bridge: PersistenceBridge,
    state: Mutex<ProviderState>,
}

#[derive(Default)]
struct ProviderState {
    cart: Cart,
    total: CartTotal,
    phase: SyncPhase,
    auth: AuthState,
    /// Set by the first persistence pass.
    initialized: bool,
}

impl CartProvider {
    /// Create a provider.
    ///
    /// `debounce` is the quiescence window for persistence writes.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        user_carts: Arc<dyn UserCartStore>,
        local: Arc<dyn LocalStore>,
        debounce: Duration,
    ) -> Self {
        let bridge = PersistenceBridge::new(debounce, Arc::clone(&local), user_carts);
        Self {
            inner: Arc::new(ProviderInner {
                catalog,
                local,
                bridge,
                state: Mutex::new(ProviderState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the guest cart from local storage and resolve its products.
    ///
    /// Runs once per provider; later calls return immediately. An auth state
    /// reported while this runs is applied right after the cart is set.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) {
        {
            let mut state = self.lock();
            if state.phase != SyncPhase::Uninitialized {
                debug!(phase = ?state.phase, "Hydration already started");
                return;
            }
            state.phase = SyncPhase::Hydrating;
        }

        let stored = load_local_cart(self.inner.local.as_ref());
        let items = if stored.is_empty() {
            Vec::new()
        } else {
            resolve_items(self.inner.catalog.as_ref(), stored).await
        };

        let mut state = self.lock();
        state.phase = SyncPhase::Ready;
        apply(&mut state, CartAction::SetCart(items));
        info!(items = state.cart.len(), "Cart hydrated");

        if let Some(action) = transition(&AuthState::Unknown, &state.auth) {
            apply(&mut state, action);
        }
        self.after_change(&mut state);
    }

    /// Report the current authentication state.
    ///
    /// Only real transitions change the cart: a new login merges the user's
    /// stored cart, a logout clears it. Reporting the same user again does
    /// nothing to the cart.
    pub fn set_auth(&self, next: AuthState) {
        match next.user() {
            Some(user) => set_sentry_user(&user.id, user.email.as_deref()),
            None => clear_sentry_user(),
        }

        let mut state = self.lock();
        let previous = std::mem::replace(&mut state.auth, next);
        debug!(from = %previous.status(), to = %state.auth.status(), "Auth state reported");

        if !state.phase.is_ready() {
            return;
        }

        let action = transition(&previous, &state.auth);
        let identity_changed = previous.user_id() != state.auth.user_id()
            || previous.status().is_known() != state.auth.status().is_known();

        let acted = action.is_some();
        if let Some(action) = action {
            apply(&mut state, action);
        }
        if acted || identity_changed {
            self.after_change(&mut state);
        }
    }

    /// Write any pending persistence now instead of waiting for the window.
    pub async fn flush(&self) -> Option<FlushOutcome> {
        self.inner.bridge.flush_pending().await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add an item; an existing entry for the product gets the quantities
    /// summed.
    pub fn add_item(&self, item: CartItem) {
        let product_id = item.product_id().to_string();
        self.dispatch(CartAction::AddItem(item), Some(&product_id));
    }

    /// Remove a product from the cart.
    pub fn delete_item(&self, product: &ProductId) {
        self.dispatch(CartAction::DeleteItem(product.clone()), Some(product.as_str()));
    }

    /// Remove every item.
    pub fn clear_cart(&self) {
        self.dispatch(CartAction::ClearCart, None);
    }

    fn dispatch(&self, action: CartAction, product_id: Option<&str>) {
        let data = product_id.map(|id| [("product_id", id)]);
        add_breadcrumb("cart", action.name(), data.as_ref().map(|pairs| pairs.as_slice()));

        let mut state = self.lock();
        apply(&mut state, action);
        self.after_change(&mut state);
    }

    /// Schedule persistence of the current cart once hydrated with known
    /// auth.
    fn after_change(&self, state: &mut ProviderState) {
        if !state.phase.is_ready() || !state.auth.status().is_known() {
            return;
        }

        self.inner.bridge.schedule(CartWrite {
            user: state.auth.user_id().cloned(),
            cart: state.cart.flatten(),
        });
        state.initialized = true;
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of the current cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.lock().cart.clone()
    }

    /// Total of the current cart.
    #[must_use]
    pub fn cart_total(&self) -> CartTotal {
        self.lock().total.clone()
    }

    /// Whether the cart has settled and holds no items.
    ///
    /// `false` while the cart is still loading, even though it is empty then.
    #[must_use]
    pub fn cart_is_empty(&self) -> bool {
        let state = self.lock();
        state.initialized && state.cart.is_empty()
    }

    /// Whether the first persistence pass has run.
    #[must_use]
    pub fn has_initialized_cart(&self) -> bool {
        self.lock().initialized
    }

    /// Whether the product is in the cart, bare or resolved.
    #[must_use]
    pub fn is_product_in_cart(&self, product: &ProductId) -> bool {
        self.lock().cart.contains(product)
    }

    /// Hydration phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.lock().phase
    }

    /// Last reported auth status.
    #[must_use]
    pub fn auth_status(&self) -> AuthStatus {
        self.lock().auth.status()
    }

    /// Whether a persistence write is waiting for its window.
    #[must_use]
    pub fn has_pending_write(&self) -> bool {
        self.inner.bridge.has_pending()
    }
}

fn apply(state: &mut ProviderState, action: CartAction) {
    let name = action.name();
    state.cart = cart_reducer(std::mem::take(&mut state.cart), action);
    state.total = cart_total(&state.cart);
    debug!(action = name, items = state.cart.len(), total = state.total.raw, "Cart updated");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartsync_core::{PersistedCart, UserId};

    use super::*;
    use crate::auth::AuthUser;
    use crate::storage::{CART_KEY, MemoryStore};
    use crate::testing::{RecordingUserCarts, StubCatalog};

    const WINDOW: Duration = Duration::from_millis(1000);

    fn pid(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    struct Harness {
        provider: CartProvider,
        local: Arc<MemoryStore>,
        remote: Arc<RecordingUserCarts>,
    }

    fn harness(stored: Option<&str>) -> Harness {
        let local = Arc::new(match stored {
            Some(payload) => MemoryStore::with_entry(CART_KEY, payload),
            None => MemoryStore::new(),
        });
        let remote = Arc::new(RecordingUserCarts::default());
        let catalog = Arc::new(StubCatalog::with_products([("p1", 1000), ("p2", 250)]));
        let provider = CartProvider::new(catalog, remote.clone(), local.clone(), WINDOW);
        Harness {
            provider,
            local,
            remote,
        }
    }

    fn logged_in(id: &str, stored: &[(&str, u32)]) -> AuthState {
        let cart = Cart::from_items(stored.iter().map(|(p, q)| CartItem::new(pid(p), *q)));
        AuthState::LoggedIn(AuthUser::new(UserId::parse(id).unwrap()).with_cart(cart))
    }

    fn quantity_of(provider: &CartProvider, id: &str) -> Option<u32> {
        provider.cart().get(&pid(id)).map(|item| item.quantity.get())
    }

    #[tokio::test]
    async fn test_hydrate_resolves_stored_cart() {
        let h = harness(Some(r#"{"items":[{"product":"p1","quantity":2}]}"#));
        assert_eq!(h.provider.phase(), SyncPhase::Uninitialized);

        h.provider.hydrate().await;

        assert_eq!(h.provider.phase(), SyncPhase::Ready);
        let cart = h.provider.cart();
        assert_eq!(cart.len(), 1);
        assert!(cart.items()[0].product.is_resolved());
        assert_eq!(h.provider.cart_total().raw, 2000);
        assert_eq!(h.provider.cart_total().formatted, "$20.00");
    }

    #[tokio::test]
    async fn test_hydrate_runs_once() {
        let h = harness(Some(r#"{"items":[{"product":"p1","quantity":2}]}"#));
        h.provider.hydrate().await;
        h.provider.add_item(CartItem::new(pid("p2"), 1));

        h.provider.hydrate().await;
        assert_eq!(h.provider.cart().len(), 2);
    }

    #[tokio::test]
    async fn test_cart_is_empty_waits_for_settle() {
        let h = harness(None);
        assert!(!h.provider.cart_is_empty());

        h.provider.hydrate().await;
        // Auth still unknown, nothing persisted yet
        assert!(!h.provider.has_initialized_cart());
        assert!(!h.provider.cart_is_empty());

        h.provider.set_auth(AuthState::Unauthenticated);
        assert!(h.provider.has_initialized_cart());
        assert!(h.provider.cart_is_empty());
    }

    #[tokio::test]
    async fn test_login_before_hydration_merges_after_set_cart() {
        let h = harness(Some(r#"{"items":[{"product":"p1","quantity":1}]}"#));
        h.provider.set_auth(logged_in("u1", &[("p1", 2), ("p2", 1)]));

        assert_eq!(h.provider.auth_status(), AuthStatus::LoggedIn);
        assert!(h.provider.cart().is_empty());

        h.provider.hydrate().await;
        assert_eq!(quantity_of(&h.provider, "p1"), Some(3));
        assert_eq!(quantity_of(&h.provider, "p2"), Some(1));
    }

    #[tokio::test]
    async fn test_repeated_login_does_not_double_merge() {
        let h = harness(None);
        h.provider.hydrate().await;

        h.provider.set_auth(logged_in("u1", &[("p1", 2)]));
        h.provider.set_auth(logged_in("u1", &[("p1", 2)]));
        assert_eq!(quantity_of(&h.provider, "p1"), Some(2));
    }

    #[tokio::test]
    async fn test_logout_clears_cart() {
        let h = harness(None);
        h.provider.hydrate().await;
        h.provider.set_auth(logged_in("u1", &[("p1", 2)]));
        assert!(h.provider.is_product_in_cart(&pid("p1")));

        h.provider.set_auth(AuthState::LoggedOut);
        assert!(h.provider.cart().is_empty());
        assert!(h.provider.cart_is_empty());
        assert_eq!(h.provider.cart_total().raw, 0);
    }

    #[tokio::test]
    async fn test_mutations_update_total() {
        let h = harness(None);
        h.provider.hydrate().await;
        h.provider.set_auth(AuthState::Unauthenticated);

        let catalog = StubCatalog::with_products([("p2", 250)]);
        let p2 = catalog.fetch_product(&pid("p2")).await.unwrap();
        h.provider.add_item(CartItem::new(p2.clone(), 2));
        h.provider.add_item(CartItem::new(p2, 3));
        assert_eq!(quantity_of(&h.provider, "p2"), Some(5));
        assert_eq!(h.provider.cart_total().raw, 1250);

        h.provider.delete_item(&pid("p2"));
        assert!(!h.provider.is_product_in_cart(&pid("p2")));
        assert_eq!(h.provider.cart_total().formatted, "$0.00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_changes_persist_locally() {
        let h = harness(None);
        h.provider.hydrate().await;
        h.provider.set_auth(AuthState::Unauthenticated);
        h.provider.add_item(CartItem::new(pid("p1"), 2));
        assert!(h.provider.has_pending_write());

        tokio::time::sleep(WINDOW * 2).await;

        let saved: PersistedCart =
            serde_json::from_str(&h.local.get(CART_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(Cart::from(saved), Cart::from_items([CartItem::new(pid("p1"), 2)]));
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_persists_before_auth_resolves() {
        let h = harness(None);
        h.provider.hydrate().await;
        h.provider.add_item(CartItem::new(pid("p1"), 2));

        tokio::time::sleep(WINDOW * 2).await;
        assert!(!h.provider.has_pending_write());
        assert_eq!(h.local.get(CART_KEY).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logged_in_changes_persist_remotely() {
        let h = harness(Some(r#"{"items":[{"product":"p1","quantity":1}]}"#));
        h.provider.hydrate().await;
        h.provider.set_auth(logged_in("u1", &[]));
        h.provider.add_item(CartItem::new(pid("p2"), 1));

        assert_eq!(h.provider.flush().await, Some(FlushOutcome::Remote));

        let calls = h.remote.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_str(), "u1");
        assert_eq!(calls[0].1, h.provider.cart().flatten());
        assert_eq!(h.local.get(CART_KEY).unwrap(), None);
    }
}
