//! Loading the guest cart from local storage and resolving its products.

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use cartsync_core::{Cart, CartItem, ProductRef};

use crate::cms::ProductCatalog;
use crate::storage::{CART_KEY, LocalStore};

/// Read the stored guest cart.
///
/// Absent, unreadable and unparsable payloads all yield an empty cart.
#[must_use]
pub fn load_local_cart(store: &dyn LocalStore) -> Cart {
    let raw = match store.get(CART_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Cart::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read stored cart");
            return Cart::new();
        }
    };

    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => Cart::from_json(&value),
        Err(e) => {
            warn!(error = %e, "Stored cart is not valid JSON, starting empty");
            Cart::new()
        }
    }
}

/// Resolve every bare product id in `cart` to a snapshot.
///
/// Fetches run concurrently; the result keeps the cart's order and
/// quantities. Items already resolved are kept without a fetch. An item
/// whose product cannot be fetched is dropped.
#[instrument(skip_all, fields(items = cart.len()))]
pub async fn resolve_items(catalog: &dyn ProductCatalog, cart: Cart) -> Vec<CartItem> {
    let fetches = cart.into_items().into_iter().map(|item| async move {
        let CartItem { product, quantity } = item;
        match product {
            ProductRef::Snapshot(_) => Some(CartItem { product, quantity }),
            ProductRef::Id(id) => match catalog.fetch_product(&id).await {
                Ok(snapshot) => Some(CartItem::new(snapshot, quantity)),
                Err(e) => {
                    warn!(
                        product_id = %id,
                        error = %e,
                        "Dropping cart item that could not be resolved"
                    );
                    None
                }
            },
        }
    });

    let resolved: Vec<CartItem> = join_all(fetches).await.into_iter().flatten().collect();
    debug!(resolved = resolved.len(), "Cart items resolved");
    resolved
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartsync_core::{ProductId, ProductSnapshot};

    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::StubCatalog;

    fn pid(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    #[test]
    fn test_load_absent_is_empty() {
        assert!(load_local_cart(&MemoryStore::new()).is_empty());
    }

    #[test]
    fn test_load_garbage_is_empty() {
        let store = MemoryStore::with_entry(CART_KEY, "{not json");
        assert!(load_local_cart(&store).is_empty());

        let store = MemoryStore::with_entry(CART_KEY, "42");
        assert!(load_local_cart(&store).is_empty());
    }

    #[test]
    fn test_load_flattened_payload() {
        let store = MemoryStore::with_entry(
            CART_KEY,
            r#"{"items":[{"product":"p1","quantity":2},{"product":"p2","quantity":1}]}"#,
        );
        let cart = load_local_cart(&store);
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.total_quantity(), 3);
        assert!(!cart.items()[0].product.is_resolved());
    }

    #[tokio::test]
    async fn test_resolve_preserves_order_and_quantity() {
        let catalog = StubCatalog::with_products([("p1", 1000), ("p2", 250), ("p3", 5)]);
        let cart = Cart::from_items([
            CartItem::new(pid("p3"), 1),
            CartItem::new(pid("p1"), 4),
            CartItem::new(pid("p2"), 2),
        ]);

        let items = resolve_items(&catalog, cart).await;
        let summary: Vec<_> = items
            .iter()
            .map(|i| (i.product_id().as_str(), i.quantity.get(), i.product.is_resolved()))
            .collect();
        assert_eq!(summary, [("p3", 1, true), ("p1", 4, true), ("p2", 2, true)]);
    }

    #[tokio::test]
    async fn test_resolve_drops_only_failed_items() {
        let catalog = StubCatalog::with_products([("p1", 1000)]);
        let cart = Cart::from_items([CartItem::new(pid("gone"), 1), CartItem::new(pid("p1"), 2)]);

        let items = resolve_items(&catalog, cart).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id().as_str(), "p1");
    }

    #[tokio::test]
    async fn test_resolve_skips_fetch_for_snapshots() {
        let catalog = StubCatalog::default();
        let cart = Cart::from_items([CartItem::new(ProductSnapshot::new(pid("p1"), None), 1)]);

        let items = resolve_items(&catalog, cart).await;
        assert_eq!(items.len(), 1);
        assert_eq!(catalog.fetch_count(), 0);
    }
}
