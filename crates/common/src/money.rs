//! Decimal money amounts in major currency units.

use std::str::FromStr;

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of decimal places in the minor unit of every supported currency.
pub const MINOR_UNIT_DIGITS: u32 = 2;

/// A money amount in major currency units (e.g. `29.99`).
///
/// Arithmetic is exact and checked; rounding to the minor unit only happens
/// when [`Money::round`] is called. Serializes as a JSON number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Money {
    /// Wraps a decimal amount.
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates an amount from minor units (e.g. `2999` cents = `29.99`).
    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, MINOR_UNIT_DIGITS))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Rounds to the currency's minor unit, half away from zero.
    pub fn round(&self) -> Money {
        Self(
            self.0
                .round_dp_with_strategy(MINOR_UNIT_DIGITS, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Converts to integer minor units after rounding.
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    pub fn to_minor_units(&self) -> Option<i64> {
        self.round().0.checked_mul(Decimal::ONE_HUNDRED)?.to_i64()
    }

    /// Returns the amount as a float, for metrics.
    pub fn as_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiplies by a quantity. Returns `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(Decimal::from(quantity)).map(Self)
    }

    /// Adds two amounts. Returns `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Subtracts an amount. Returns `None` on overflow.
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Sums amounts, or `None` if the total overflows.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |total, amount| total.checked_add(amount))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Self)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}
