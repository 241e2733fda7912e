//! Money in minor currency units and the derived cart total.
//!
//! Amounts are carried as integer cents and only turned into decimals for
//! display. Only USD is rendered; there is no currency conversion.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An amount in minor currency units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero cents.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(cents: i64) -> Self {
        Self(cents)
    }

    /// Amount in minor units.
    #[must_use]
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    #[must_use]
    pub fn amount(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Multiply by a quantity, saturating on overflow.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Add two amounts, saturating on overflow.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Format for display in en-US style (e.g., "$1,234.56").
    #[must_use]
    pub fn display(self) -> String {
        let amount = self.amount().abs().round_dp(2);
        let text = format!("{amount:.2}");
        let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{sign}${}.{frac}", group_thousands(whole))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Insert `,` separators every three digits from the right.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Derived cart total. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotal {
    /// Sum in minor units.
    pub raw: i64,
    /// Locale-formatted currency string.
    pub formatted: String,
}

impl CartTotal {
    /// Build a total from a summed amount.
    #[must_use]
    pub fn new(sum: Money) -> Self {
        Self {
            raw: sum.minor_units(),
            formatted: sum.display(),
        }
    }
}

impl Default for CartTotal {
    fn default() -> Self {
        Self::new(Money::ZERO)
    }
}
