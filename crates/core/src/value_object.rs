//! Value objects: compared by value, immutable once built.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker for types without identity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Amount in minor currency units (cents).
///
/// Document totals are computed with checked arithmetic so an absurd quantity
/// surfaces as a validation error instead of wrapping.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> u64 {
        self.0
    }

    /// `unit_price * quantity`, rejecting negative quantities and overflow.
    pub fn line_amount(unit_price: Money, quantity: i64) -> DomainResult<Money> {
        let qty = u64::try_from(quantity)
            .map_err(|_| DomainError::validation("quantity must not be negative"))?;
        unit_price
            .0
            .checked_mul(qty)
            .map(Money)
            .ok_or_else(|| DomainError::validation("line amount overflows"))
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflows"))
    }

    /// Applies a rate in basis points (1/100 of a percent), rounding half up.
    pub fn percentage_bps(self, bps: u32) -> Money {
        let scaled = u128::from(self.0) * u128::from(bps);
        let rounded = (scaled + 5_000) / 10_000;
        Money(u64::try_from(rounded).unwrap_or(u64::MAX))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_amount_multiplies_cents() {
        let amount = Money::line_amount(Money::from_cents(1_250), 4).unwrap();
        assert_eq!(amount.cents(), 5_000);
    }

    #[test]
    fn line_amount_rejects_overflow() {
        let err = Money::line_amount(Money::from_cents(u64::MAX), 2).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn tax_rounds_half_up() {
        // 10.05 at 5% = 0.5025 -> 0.50
        assert_eq!(Money::from_cents(1_005).percentage_bps(500).cents(), 50);
        // 0.10 at 5% = 0.005 -> 0.01
        assert_eq!(Money::from_cents(10).percentage_bps(500).cents(), 1);
    }

    #[test]
    fn displays_with_two_decimals() {
        assert_eq!(Money::from_cents(123_405).to_string(), "1234.05");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }
}
