use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::Money;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A payment intent created at the gateway.
///
/// The client secret is handed to the caller once and never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct IntentCreated {
    pub intent_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for IntentCreated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentCreated")
            .field("intent_id", &self.intent_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Outcome of confirming an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    Canceled,
    /// The charge was declined or otherwise failed.
    Failed { reason: Option<String> },
}

impl IntentStatus {
    /// Maps a Stripe intent status string.
    pub fn from_gateway_status(status: &str) -> Self {
        match status {
            "succeeded" => IntentStatus::Succeeded,
            "processing" => IntentStatus::Processing,
            "requires_action" | "requires_confirmation" => IntentStatus::RequiresAction,
            "canceled" => IntentStatus::Canceled,
            other => IntentStatus::Failed {
                reason: Some(other.to_string()),
            },
        }
    }

    /// Returns true if the money was captured.
    pub fn is_success(&self) -> bool {
        matches!(self, IntentStatus::Succeeded)
    }
}

/// A refund created at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundCreated {
    pub refund_id: String,
    pub amount: Money,
    pub currency: String,
    /// Gateway's refund status, e.g. `succeeded` or `pending`.
    pub status: String,
}

/// Contract with the external payment gateway.
///
/// Amounts are major units; adapters convert to the gateway's minor units.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent for an amount.
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<IntentCreated>;

    /// Confirms an intent with a payment method reference.
    async fn confirm_intent(&self, intent_id: &str, payment_method: &str) -> Result<IntentStatus>;

    /// Refunds a captured intent. `None` refunds the full amount.
    ///
    /// Repeating a request with the same idempotency key returns the refund
    /// created by the first one instead of moving money again.
    async fn create_refund(
        &self,
        intent_id: &str,
        amount: Option<Money>,
        reason: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<RefundCreated>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<IntentCreated> {
        (**self).create_intent(amount, currency, metadata).await
    }

    async fn confirm_intent(&self, intent_id: &str, payment_method: &str) -> Result<IntentStatus> {
        (**self).confirm_intent(intent_id, payment_method).await
    }

    async fn create_refund(
        &self,
        intent_id: &str,
        amount: Option<Money>,
        reason: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<RefundCreated> {
        (**self)
            .create_refund(intent_id, amount, reason, idempotency_key)
            .await
    }
}
