//! Value objects for the order domain.

use common::Money;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A line item in an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,

    #[serde(default)]
    pub product_name: String,

    /// Price of a single unit. Accepted as `price` on input.
    #[serde(alias = "price")]
    pub unit_price: Money,

    pub quantity: u32,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            unit_price,
            quantity,
        }
    }

    /// Returns the unrounded price of the line (unit price × quantity), or
    /// `None` if it does not fit in a decimal.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A postal address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub phone: String,
}

impl Address {
    /// Returns true if the address has enough detail to ship to.
    pub fn is_deliverable(&self) -> bool {
        !self.street.trim().is_empty() && !self.city.trim().is_empty()
    }
}

/// Sums the line totals and rounds once to the minor unit.
///
/// # Errors
///
/// Returns a validation error if a line or the total overflows.
pub fn calculate_total(items: &[OrderItem]) -> Result<Money> {
    let mut total = Money::zero();
    for item in items {
        total = item
            .line_total()
            .and_then(|line| total.checked_add(line))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "order total overflows at product {}",
                    item.product_id.as_str()
                ))
            })?;
    }
    Ok(total.round())
}
