//! Cart total calculation.

use cartsync_core::{Cart, CartTotal, Money};

/// Sum of `unit price x quantity` over resolved items.
///
/// Items still holding a bare product id contribute nothing, as do products
/// whose price data cannot be parsed.
#[must_use]
pub fn cart_total(cart: &Cart) -> CartTotal {
    let sum = cart
        .items()
        .iter()
        .filter_map(|item| {
            item.product
                .as_snapshot()
                .map(|product| product.unit_amount().times(item.quantity.get()))
        })
        .fold(Money::ZERO, Money::saturating_add);

    CartTotal::new(sum)
}
