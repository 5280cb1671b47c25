//! Payment commands.

use std::collections::HashMap;

use common::{Money, UserId};
use serde::Deserialize;

use crate::error::{DomainError, Result};
use crate::pagination::Window;

use super::model::Payment;
use super::state::PaymentStatus;

/// Currency used when a create request names none.
pub const DEFAULT_PAYMENT_CURRENCY: &str = "usd";

/// Command to open a payment intent for an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateIntent {
    pub amount: Money,

    /// Defaults to `usd`.
    #[serde(default)]
    pub currency: Option<String>,

    pub order_id: String,

    #[serde(default = "blank_user")]
    pub user_id: UserId,

    /// Passed to the gateway and stored verbatim.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn blank_user() -> UserId {
    UserId::new("")
}

impl CreateIntent {
    pub fn new(amount: Money, order_id: impl Into<String>, user_id: UserId) -> Self {
        Self {
            amount,
            currency: None,
            order_id: order_id.into(),
            user_id,
            metadata: HashMap::new(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(DomainError::validation("amount must be greater than 0"));
        }
        if self.order_id.trim().is_empty() {
            return Err(DomainError::validation("order id is required"));
        }
        if self.user_id.is_blank() {
            return Err(DomainError::validation("user id is required"));
        }
        Ok(())
    }

    /// Returns the lowercase currency code, defaulting to `usd`.
    pub fn currency(&self) -> String {
        self.currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_PAYMENT_CURRENCY)
            .to_lowercase()
    }
}

/// A freshly opened intent.
///
/// The client secret is only ever returned here; it is not stored.
#[derive(Clone)]
pub struct CreatedIntent {
    pub payment: Payment,
    pub client_secret: String,
}

impl std::fmt::Debug for CreatedIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedIntent")
            .field("payment", &self.payment)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Command to refund a completed payment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundPayment {
    /// Defaults to the full payment amount.
    #[serde(default)]
    pub amount: Option<Money>,

    /// Defaults to `requested_by_customer`.
    #[serde(default)]
    pub reason: Option<String>,
}

impl RefundPayment {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn partial(amount: Money) -> Self {
        Self {
            amount: Some(amount),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Filter for listing payments. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<UserId>,
    pub order_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub window: Window,
}
