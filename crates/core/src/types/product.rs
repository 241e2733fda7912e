//! Product snapshots fetched from the catalog.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Money, ProductId};

/// A resolved product as returned by the catalog.
///
/// Only the id and pricing data are interpreted here. Every other field the
/// backend returns is preserved in `extra` so a snapshot survives a serde
/// round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Catalog id.
    pub id: ProductId,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Serialized price list, `{"data": [{"unit_amount": 1999, ...}, ...]}`.
    #[serde(rename = "priceJSON", default, skip_serializing_if = "Option::is_none")]
    pub price_json: Option<String>,
    /// Remaining backend fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProductSnapshot {
    /// Create a snapshot with just an id and price data.
    #[must_use]
    pub fn new(id: ProductId, price_json: Option<String>) -> Self {
        Self {
            id,
            title: None,
            price_json,
            extra: Map::new(),
        }
    }

    /// Unit price of the first listed price, or zero if the price data is
    /// missing or unparsable.
    #[must_use]
    pub fn unit_amount(&self) -> Money {
        self.price_json
            .as_deref()
            .and_then(first_unit_amount)
            .map_or(Money::ZERO, Money::from_minor)
    }
}

#[allow(clippy::cast_possible_truncation)] // Float prices are rounded to whole cents
fn first_unit_amount(price_json: &str) -> Option<i64> {
    let prices: Value = serde_json::from_str(price_json).ok()?;
    let amount = prices.get("data")?.get(0)?.get("unit_amount")?;

    amount.as_i64().or_else(|| {
        amount
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| f.round() as i64)
    })
}
