//! The order record and its pure state changes.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use ledger::Table;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::record::Record;

use super::commands::{CreateOrder, UpdateOrder};
use super::state::OrderStatus;
use super::value_objects::{Address, OrderItem, calculate_total};

pub const DEFAULT_CURRENCY: &str = "USD";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// An order as stored in the ledger.
///
/// `total_price` is always derived from `items`; it is recomputed whenever
/// the items change and never taken from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_price: Money,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new pending order from a validated create request.
    pub fn place(cmd: CreateOrder, now: DateTime<Utc>) -> Result<Self> {
        cmd.validate()?;

        let total_price = calculate_total(&cmd.items)?;
        let billing_address = cmd
            .billing_address
            .unwrap_or_else(|| cmd.shipping_address.clone());

        Ok(Self {
            id: OrderId::new(),
            user_id: cmd.user_id,
            status: OrderStatus::Pending,
            items: cmd.items,
            total_price,
            currency: cmd.currency.unwrap_or_else(default_currency),
            shipping_address: cmd.shipping_address,
            billing_address,
            payment_method: cmd.payment_method,
            payment_id: None,
            paid_at: None,
            tracking_number: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            notes: cmd.notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns a copy with the requested edits applied.
    ///
    /// Only pending and confirmed orders can be edited.
    pub fn apply_update(&self, update: &UpdateOrder, now: DateTime<Utc>) -> Result<Self> {
        if !self.status.can_modify() {
            return Err(DomainError::InvalidState(format!(
                "order {} cannot be modified in {} status",
                self.id, self.status
            )));
        }
        update.validate()?;

        let mut next = self.clone();
        if let Some(items) = &update.items {
            next.items = items.clone();
            next.total_price = calculate_total(items)?;
        }
        if let Some(address) = &update.shipping_address {
            next.shipping_address = address.clone();
        }
        if let Some(address) = &update.billing_address {
            next.billing_address = address.clone();
        }
        if let Some(notes) = &update.notes {
            next.notes = Some(notes.clone());
        }
        next.updated_at = now;
        Ok(next)
    }

    /// Returns a copy moved to `to`, stamping the matching timestamp.
    ///
    /// A tracking number is only recorded when shipping.
    pub fn transition(
        &self,
        to: OrderStatus,
        tracking_number: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::invalid_transition(self.status, to));
        }

        let mut next = self.clone();
        next.status = to;
        next.updated_at = now;
        match to {
            OrderStatus::Shipped => {
                next.shipped_at = Some(now);
                if let Some(tracking) = tracking_number {
                    next.tracking_number = Some(tracking.to_string());
                }
            }
            OrderStatus::Delivered => next.delivered_at = Some(now),
            OrderStatus::Cancelled => next.cancelled_at = Some(now),
            _ => {}
        }
        Ok(next)
    }

    /// Returns a confirmed copy carrying the payment, or `None` if the
    /// payment is already recorded or the order has moved past pending.
    pub fn record_payment(&self, payment_id: &PaymentId, now: DateTime<Utc>) -> Option<Self> {
        if self.payment_id.as_ref() == Some(payment_id) || self.status != OrderStatus::Pending {
            return None;
        }

        let mut next = self.clone();
        next.payment_id = Some(payment_id.clone());
        next.paid_at = Some(now);
        next.status = OrderStatus::Confirmed;
        next.updated_at = now;
        Some(next)
    }
}

impl Record for Order {
    const TABLE: Table = Table::Orders;

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn owner_id(&self) -> Option<&str> {
        Some(self.user_id.as_str())
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn cache_key(id: &str) -> String {
        format!("order:{id}")
    }
}
