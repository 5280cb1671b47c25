//! Payment domain events.

use common::{Money, PaymentId, UserId};
use events::Exchange;
use serde::{Deserialize, Serialize};

use crate::record::DomainEvent;

use super::model::{Payment, Refund};
use super::state::PaymentStatus;

/// Events published on the `payments` exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PaymentEvent {
    /// A payment intent was opened.
    IntentCreated(PaymentEventData),

    /// The money was captured.
    Completed(PaymentEventData),

    /// The charge failed.
    Failed(PaymentEventData),

    /// The payment was refunded. Carries the refund when it was issued here.
    Refunded(PaymentEventData),
}

impl PaymentEvent {
    pub const INTENT_CREATED: &'static str = "payment.intent.created";
    pub const COMPLETED: &'static str = "payment.completed";
    pub const FAILED: &'static str = "payment.failed";
    pub const REFUNDED: &'static str = "payment.refunded";

    pub fn intent_created(payment: &Payment) -> Self {
        PaymentEvent::IntentCreated(PaymentEventData::new(payment, None))
    }

    /// Builds the event announcing that `payment` reached its current status.
    ///
    /// Returns `None` for pending payments.
    pub fn settled(payment: &Payment, refund: Option<&Refund>) -> Option<Self> {
        let data = PaymentEventData::new(payment, refund);
        match payment.status {
            PaymentStatus::Pending => None,
            PaymentStatus::Completed => Some(PaymentEvent::Completed(data)),
            PaymentStatus::Failed => Some(PaymentEvent::Failed(data)),
            PaymentStatus::Refunded => Some(PaymentEvent::Refunded(data)),
        }
    }

    pub fn data(&self) -> &PaymentEventData {
        match self {
            PaymentEvent::IntentCreated(data)
            | PaymentEvent::Completed(data)
            | PaymentEvent::Failed(data)
            | PaymentEvent::Refunded(data) => data,
        }
    }
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::IntentCreated(_) => Self::INTENT_CREATED,
            PaymentEvent::Completed(_) => Self::COMPLETED,
            PaymentEvent::Failed(_) => Self::FAILED,
            PaymentEvent::Refunded(_) => Self::REFUNDED,
        }
    }

    fn exchange(&self) -> Exchange {
        Exchange::Payments
    }
}

/// Payload shared by all payment events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEventData {
    pub payment_id: PaymentId,
    pub order_id: String,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment: Payment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund: Option<Refund>,
}

impl PaymentEventData {
    pub fn new(payment: &Payment, refund: Option<&Refund>) -> Self {
        Self {
            payment_id: payment.id.clone(),
            order_id: payment.order_id.clone(),
            user_id: payment.user_id.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            status: payment.status,
            payment: payment.clone(),
            refund: refund.cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use common::RefundId;

    use super::*;

    fn payment(status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: PaymentId::new("pi_0001"),
            order_id: "order-1".to_string(),
            user_id: UserId::new("user-1"),
            amount: "99.99".parse().unwrap(),
            currency: "usd".to_string(),
            status,
            gateway_intent_id: "pi_0001".to_string(),
            metadata: HashMap::new(),
            failure_reason: None,
            completed_at: None,
            failed_at: None,
            refunded_at: None,
            refund_requested_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_event_types_follow_status() {
        assert_eq!(
            PaymentEvent::intent_created(&payment(PaymentStatus::Pending)).event_type(),
            "payment.intent.created"
        );
        assert!(PaymentEvent::settled(&payment(PaymentStatus::Pending), None).is_none());
        assert_eq!(
            PaymentEvent::settled(&payment(PaymentStatus::Completed), None)
                .map(|e| e.event_type()),
            Some("payment.completed")
        );
        assert_eq!(
            PaymentEvent::settled(&payment(PaymentStatus::Failed), None).map(|e| e.event_type()),
            Some("payment.failed")
        );
        assert_eq!(
            PaymentEvent::settled(&payment(PaymentStatus::Refunded), None)
                .map(|e| e.event_type()),
            Some("payment.refunded")
        );
    }

    #[test]
    fn test_refunded_payload_carries_refund() {
        let payment = payment(PaymentStatus::Refunded);
        let refund = Refund {
            id: RefundId::new("re_0001"),
            payment_id: payment.id.clone(),
            amount: "25.00".parse().unwrap(),
            currency: "usd".to_string(),
            status: "succeeded".to_string(),
            reason: "requested_by_customer".to_string(),
            created_at: Utc::now(),
        };

        let event = PaymentEvent::settled(&payment, Some(&refund)).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payment"]["id"], "pi_0001");
        assert_eq!(value["payment"]["order_id"], "order-1");
        assert_eq!(value["refund"]["amount"], 25.0);
        assert_eq!(value["amount"], 99.99);
    }
}
