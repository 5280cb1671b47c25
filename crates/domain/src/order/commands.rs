//! Order commands.

use common::UserId;
use serde::Deserialize;

use crate::error::{DomainError, Result};

use super::value_objects::{Address, OrderItem};

/// Command to place a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    /// The user placing the order.
    #[serde(default = "blank_user")]
    pub user_id: UserId,

    pub items: Vec<OrderItem>,

    pub shipping_address: Address,

    /// Defaults to the shipping address.
    #[serde(default)]
    pub billing_address: Option<Address>,

    #[serde(default)]
    pub payment_method: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    /// Defaults to `USD`.
    #[serde(default)]
    pub currency: Option<String>,
}

fn blank_user() -> UserId {
    UserId::new("")
}

impl CreateOrder {
    /// Creates a new CreateOrder command.
    pub fn new(user_id: UserId, items: Vec<OrderItem>, shipping_address: Address) -> Self {
        Self {
            user_id,
            items,
            shipping_address,
            billing_address: None,
            payment_method: None,
            notes: None,
            currency: None,
        }
    }

    pub fn with_billing_address(mut self, address: Address) -> Self {
        self.billing_address = Some(address);
        self
    }

    pub fn with_payment_method(mut self, payment_method: impl Into<String>) -> Self {
        self.payment_method = Some(payment_method.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Checks the request before anything is stored.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.is_blank() {
            return Err(DomainError::validation("user id is required"));
        }
        validate_items(&self.items)?;
        if !self.shipping_address.is_deliverable() {
            return Err(DomainError::validation(
                "shipping address street and city are required",
            ));
        }
        Ok(())
    }
}

/// Command to edit an order that has not started processing.
///
/// Fields left as `None` are not changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrder {
    #[serde(default)]
    pub items: Option<Vec<OrderItem>>,

    #[serde(default)]
    pub shipping_address: Option<Address>,

    #[serde(default)]
    pub billing_address: Option<Address>,

    #[serde(default)]
    pub notes: Option<String>,
}

impl UpdateOrder {
    pub fn validate(&self) -> Result<()> {
        if let Some(items) = &self.items {
            validate_items(items)?;
        }
        if let Some(address) = &self.shipping_address
            && !address.is_deliverable()
        {
            return Err(DomainError::validation(
                "shipping address street and city are required",
            ));
        }
        Ok(())
    }
}

/// Validates a list of line items.
pub fn validate_items(items: &[OrderItem]) -> Result<()> {
    if items.is_empty() {
        return Err(DomainError::validation("order must have at least one item"));
    }
    for (index, item) in items.iter().enumerate() {
        if item.product_id.is_blank() {
            return Err(DomainError::validation(format!(
                "item {index}: product id is required"
            )));
        }
        if item.quantity < 1 {
            return Err(DomainError::validation(format!(
                "item {index}: quantity must be greater than 0"
            )));
        }
        if item.unit_price.is_negative() {
            return Err(DomainError::validation(format!(
                "item {index}: price cannot be negative"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn address() -> Address {
        Address {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            ..Default::default()
        }
    }

    fn valid() -> CreateOrder {
        CreateOrder::new(
            UserId::new("user-1"),
            vec![OrderItem::new("SKU-001", "Widget", 1, money("10.00"))],
            address(),
        )
    }

    fn assert_invalid(cmd: CreateOrder, needle: &str) {
        match cmd.validate() {
            Err(DomainError::Validation(message)) => {
                assert!(message.contains(needle), "{message:?} lacks {needle:?}")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_order_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_free_items_are_allowed() {
        let mut cmd = valid();
        cmd.items[0].unit_price = Money::zero();
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn test_user_required() {
        let mut cmd = valid();
        cmd.user_id = UserId::new(" ");
        assert_invalid(cmd, "user id");
    }

    #[test]
    fn test_items_required() {
        let mut cmd = valid();
        cmd.items.clear();
        assert_invalid(cmd, "at least one item");
    }

    #[test]
    fn test_item_rules() {
        let mut cmd = valid();
        cmd.items[0].quantity = 0;
        assert_invalid(cmd, "quantity");

        let mut cmd = valid();
        cmd.items[0].unit_price = money("-1.00");
        assert_invalid(cmd, "negative");

        let mut cmd = valid();
        cmd.items[0].product_id = "".into();
        assert_invalid(cmd, "product id");
    }

    #[test]
    fn test_shipping_address_required() {
        let mut cmd = valid();
        cmd.shipping_address.street.clear();
        assert_invalid(cmd, "shipping address");
    }

    #[test]
    fn test_update_validates_only_present_fields() {
        assert!(UpdateOrder::default().validate().is_ok());

        let update = UpdateOrder {
            items: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(update.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_deserialize_without_user() {
        let cmd: CreateOrder = serde_json::from_value(serde_json::json!({
            "items": [{"product_id": "SKU-001", "price": 5.0, "quantity": 1}],
            "shipping_address": {"street": "1 Main St", "city": "Springfield"}
        }))
        .unwrap();
        assert!(cmd.user_id.is_blank());
        assert!(cmd.validate().is_err());
    }
}
