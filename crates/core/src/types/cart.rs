//! Cart model: items, product references and the flattened persisted form.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{ProductId, ProductSnapshot, Quantity};

// =============================================================================
// Product References
// =============================================================================

/// Either a bare product id (persisted form) or a resolved snapshot
/// (display and totals).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProductRef {
    /// Bare id, not yet resolved.
    Id(ProductId),
    /// Resolved product data.
    Snapshot(Box<ProductSnapshot>),
}

impl ProductRef {
    /// The referenced product id, whichever form this is.
    #[must_use]
    pub fn id(&self) -> &ProductId {
        match self {
            Self::Id(id) => id,
            Self::Snapshot(product) => &product.id,
        }
    }

    /// The resolved snapshot, if any.
    #[must_use]
    pub fn as_snapshot(&self) -> Option<&ProductSnapshot> {
        match self {
            Self::Id(_) => None,
            Self::Snapshot(product) => Some(product),
        }
    }

    /// Whether this reference carries resolved product data.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }

    /// Decode a reference from backend JSON.
    ///
    /// Strings and numbers are bare ids, objects are snapshots. Returns `None`
    /// for `null`, blank ids and objects without a usable id.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => ProductId::parse(s).ok().map(Self::Id),
            Value::Number(n) => ProductId::parse(&n.to_string()).ok().map(Self::Id),
            Value::Object(_) => serde_json::from_value::<ProductSnapshot>(value.clone())
                .ok()
                .map(|p| Self::Snapshot(Box::new(p))),
            _ => None,
        }
    }
}

impl From<ProductId> for ProductRef {
    fn from(id: ProductId) -> Self {
        Self::Id(id)
    }
}

impl From<ProductSnapshot> for ProductRef {
    fn from(product: ProductSnapshot) -> Self {
        Self::Snapshot(Box::new(product))
    }
}

impl<'de> Deserialize<'de> for ProductRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a product id or product object"))
    }
}

// =============================================================================
// Cart Items
// =============================================================================

/// One cart line: a product and how many of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// The product, bare or resolved.
    pub product: ProductRef,
    /// Number of units. Malformed values coerce to zero.
    #[serde(default)]
    pub quantity: Quantity,
}

impl CartItem {
    /// Create a cart item.
    #[must_use]
    pub fn new(product: impl Into<ProductRef>, quantity: impl Into<Quantity>) -> Self {
        Self {
            product: product.into(),
            quantity: quantity.into(),
        }
    }

    /// The product id of this item.
    #[must_use]
    pub fn product_id(&self) -> &ProductId {
        self.product.id()
    }

    /// Decode an item leniently. Returns `None` when the product cannot be
    /// resolved to an id; a bad quantity coerces to zero.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let product = ProductRef::from_json(value.get("product")?)?;
        let quantity = value
            .get("quantity")
            .map_or(Quantity::ZERO, Quantity::from_json);
        Some(Self { product, quantity })
    }
}

// =============================================================================
// Cart
// =============================================================================

/// An ordered cart holding at most one item per product id.
///
/// The one-entry-per-product invariant is kept by [`Cart::accumulate`], which
/// every constructor funnels through. Insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from items, folding duplicate products together.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            cart.accumulate(item);
        }
        cart
    }

    /// Decode a cart payload leniently.
    ///
    /// A missing or non-array `items` field is an empty cart. Items whose
    /// product cannot be decoded are dropped.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let Some(items) = value.get("items").and_then(Value::as_array) else {
            return Self::new();
        };

        Self::from_items(items.iter().filter_map(CartItem::from_json))
    }

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Consume the cart, returning its items in order.
    #[must_use]
    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all item quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(Quantity::ZERO, |acc, item| acc.saturating_add(item.quantity))
            .get()
    }

    /// Look up the item for a product.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id() == id)
    }

    /// Whether the cart holds the product, in bare or resolved form.
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.get(id).is_some()
    }

    /// Add an item. An existing entry for the same product gets the sum of
    /// both quantities; a resolved snapshot wins over a bare id.
    pub fn accumulate(&mut self, item: CartItem) {
        match self
            .items
            .iter_mut()
            .find(|existing| existing.product_id() == item.product_id())
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                if !existing.product.is_resolved() && item.product.is_resolved() {
                    existing.product = item.product;
                }
            }
            None => self.items.push(item),
        }
    }

    /// Remove the item for a product. Returns whether anything was removed.
    pub fn remove(&mut self, id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product_id() != id);
        self.items.len() != before
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Reduce every item to its bare product id for persistence.
    #[must_use]
    pub fn flatten(&self) -> PersistedCart {
        PersistedCart {
            items: self
                .items
                .iter()
                .map(|item| PersistedItem {
                    product: item.product_id().clone(),
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

impl<'de> Deserialize<'de> for Cart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

impl From<PersistedCart> for Cart {
    fn from(persisted: PersistedCart) -> Self {
        Self::from_items(
            persisted
                .items
                .into_iter()
                .map(|item| CartItem::new(item.product, item.quantity)),
        )
    }
}

// =============================================================================
// Persisted (flattened) form
// =============================================================================

/// The flattened cart: every product is a bare id.
///
/// This is the only shape written to local storage or sent to the remote
/// user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCart {
    /// Flattened items.
    pub items: Vec<PersistedItem>,
}

impl PersistedCart {
    /// Whether there are no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One flattened cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedItem {
    /// Product id.
    pub product: ProductId,
    /// Number of units.
    pub quantity: Quantity,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pid(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    fn resolved(id: &str, cents: i64) -> ProductSnapshot {
        ProductSnapshot::new(
            pid(id),
            Some(format!(r#"{{"data":[{{"unit_amount":{cents}}}]}}"#)),
        )
    }

    #[test]
    fn test_from_json_drops_unresolvable_products() {
        let cart = Cart::from_json(&json!({
            "items": [
                { "product": "p1", "quantity": 2 },
                { "product": null, "quantity": 1 },
                { "product": "", "quantity": 1 },
                { "quantity": 4 },
                { "product": { "title": "no id" }, "quantity": 1 },
                { "product": { "id": "p2", "priceJSON": "{}" }, "quantity": "x" }
            ]
        }));

        assert_eq!(cart.len(), 2);
        assert_eq!(cart.items()[0].quantity.get(), 2);
        assert!(cart.items()[1].product.is_resolved());
        assert_eq!(cart.items()[1].quantity, Quantity::ZERO);
    }

    #[test]
    fn test_from_json_missing_items() {
        assert!(Cart::from_json(&json!({})).is_empty());
        assert!(Cart::from_json(&json!([])).is_empty());
        assert!(Cart::from_json(&json!({ "items": "nope" })).is_empty());
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        let cart = Cart::from_json(&json!({ "items": [{ "product": 17, "quantity": 1 }] }));
        assert_eq!(cart.items()[0].product_id().as_str(), "17");
    }

    #[test]
    fn test_accumulate_prefers_resolved_product() {
        let mut cart = Cart::from_items([CartItem::new(pid("p1"), 1)]);
        cart.accumulate(CartItem::new(resolved("p1", 100), 2));

        assert_eq!(cart.len(), 1);
        assert!(cart.items()[0].product.is_resolved());
        assert_eq!(cart.items()[0].quantity.get(), 3);

        cart.accumulate(CartItem::new(pid("p1"), 1));
        assert!(cart.items()[0].product.is_resolved());
    }

    #[test]
    fn test_contains_matches_both_forms() {
        let cart = Cart::from_items([
            CartItem::new(pid("p1"), 1),
            CartItem::new(resolved("p2", 100), 1),
        ]);
        assert!(cart.contains(&pid("p1")));
        assert!(cart.contains(&pid("p2")));
        assert!(!cart.contains(&pid("p3")));
    }

    #[test]
    fn test_flatten_produces_bare_ids() {
        let cart = Cart::from_items([
            CartItem::new(resolved("p1", 100), 2),
            CartItem::new(pid("p2"), 1),
        ]);

        let flat = serde_json::to_value(cart.flatten()).unwrap();
        assert_eq!(
            flat,
            json!({ "items": [
                { "product": "p1", "quantity": 2 },
                { "product": "p2", "quantity": 1 }
            ]})
        );
    }

    #[test]
    fn test_remove_reports_change() {
        let mut cart = Cart::from_items([CartItem::new(pid("p1"), 1)]);
        assert!(!cart.remove(&pid("p9")));
        assert!(cart.remove(&pid("p1")));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_total_quantity() {
        let cart = Cart::from_items([CartItem::new(pid("p1"), 2), CartItem::new(pid("p2"), 3)]);
        assert_eq!(cart.total_quantity(), 5);
    }
}
