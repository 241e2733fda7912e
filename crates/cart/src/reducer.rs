//! Pure cart state transitions.
//!
//! [`cart_reducer`] maps `(cart, action)` to the next cart. It never fails and
//! has no side effects; malformed input was already normalized when the items
//! were decoded (unknown quantities are zero).

use cartsync_core::{Cart, CartItem, ProductId};

/// A cart mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CartAction {
    /// Replace all items (hydration result).
    SetCart(Vec<CartItem>),
    /// Fold another cart in, summing quantities of shared products.
    MergeCart(Option<Cart>),
    /// Add an item, summing with an existing entry for the same product.
    AddItem(CartItem),
    /// Remove the entry for a product.
    DeleteItem(ProductId),
    /// Remove everything.
    ClearCart,
}

impl CartAction {
    /// Action name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetCart(_) => "SET_CART",
            Self::MergeCart(_) => "MERGE_CART",
            Self::AddItem(_) => "ADD_ITEM",
            Self::DeleteItem(_) => "DELETE_ITEM",
            Self::ClearCart => "CLEAR_CART",
        }
    }
}

/// Apply an action to a cart.
///
/// - `SetCart`: replaces wholesale; duplicates in the payload are folded
/// - `MergeCart`: union with quantities summed per product; `None` or an
///   empty cart leaves the cart unchanged
/// - `AddItem`: existing product gets `existing + incoming`, else appended
/// - `DeleteItem`: removes the product, no-op if absent
/// - `ClearCart`: empty cart
#[must_use]
pub fn cart_reducer(mut cart: Cart, action: CartAction) -> Cart {
    match action {
        CartAction::SetCart(items) => Cart::from_items(items),
        CartAction::MergeCart(incoming) => {
            for item in incoming.map(Cart::into_items).unwrap_or_default() {
                cart.accumulate(item);
            }
            cart
        }
        CartAction::AddItem(item) => {
            cart.accumulate(item);
            cart
        }
        CartAction::DeleteItem(id) => {
            cart.remove(&id);
            cart
        }
        CartAction::ClearCart => Cart::new(),
    }
}
