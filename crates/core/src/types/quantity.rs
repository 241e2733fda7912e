//! Cart line quantity with lenient coercion.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A non-negative item quantity.
///
/// Quantities arrive from local storage and from the remote user record, and
/// neither is trusted to be well-formed. Anything that is not a non-negative
/// number coerces to zero instead of failing the surrounding payload.
///
/// ```
/// use cartsync_core::Quantity;
/// use serde_json::json;
///
/// assert_eq!(Quantity::from_json(&json!(3)).get(), 3);
/// assert_eq!(Quantity::from_json(&json!(-2)).get(), 0);
/// assert_eq!(Quantity::from_json(&json!("3")).get(), 0);
/// assert_eq!(Quantity::from_json(&json!(null)).get(), 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// Zero items.
    pub const ZERO: Self = Self(0);

    /// Create a quantity.
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// Get the underlying count.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Add two quantities, saturating at `u32::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Coerce an arbitrary JSON value into a quantity.
    ///
    /// Integers are clamped into `0..=u32::MAX`, finite non-negative floats
    /// are truncated, everything else is zero.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let Value::Number(n) = value else {
            return Self::ZERO;
        };

        if let Some(u) = n.as_u64() {
            return Self(u32::try_from(u).unwrap_or(u32::MAX));
        }
        if n.as_i64().is_some() {
            // Negative integer
            return Self::ZERO;
        }
        match n.as_f64() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Saturating cast of a finite non-negative float
            Some(f) if f.is_finite() && f >= 0.0 => Self(f.trunc() as u32),
            _ => Self::ZERO,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Quantity {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}
