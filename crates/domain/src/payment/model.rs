//! Payment and refund records.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use common::{Money, PaymentId, RefundId, UserId};
use ledger::Table;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::record::Record;

use super::state::PaymentStatus;

/// A payment against an order.
///
/// The id is the gateway's intent id. `amount` and `currency` never change
/// after creation; each terminal timestamp is set once, on its transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// Lookup key only; payments and orders never cascade.
    pub order_id: String,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_intent_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    /// Set while a refund is being issued at the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Returns a copy moved to `target`, or `None` if the payment already
    /// reflects it.
    pub fn settle(
        &self,
        target: PaymentStatus,
        failure_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>> {
        if self.status.has_reached(target) {
            return Ok(None);
        }
        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(self.status, target));
        }

        let mut next = self.clone();
        next.status = target;
        next.updated_at = now;
        match target {
            PaymentStatus::Completed => next.completed_at = Some(now),
            PaymentStatus::Failed => {
                next.failed_at = Some(now);
                next.failure_reason = failure_reason.map(str::to_string);
            }
            PaymentStatus::Refunded => next.refunded_at = Some(now),
            PaymentStatus::Pending => {}
        }
        Ok(Some(next))
    }

    /// Returns a copy carrying a refund claim stamped `now`.
    ///
    /// Only one caller can hold the claim; a claim older than
    /// [`REFUND_CLAIM_TIMEOUT`] is treated as abandoned and can be taken over.
    pub fn claim_refund(&self, now: DateTime<Utc>) -> Result<Self> {
        match self.status {
            PaymentStatus::Completed => {}
            PaymentStatus::Refunded => {
                return Err(DomainError::InvalidState(format!(
                    "payment {} is already refunded",
                    self.id
                )));
            }
            status => {
                return Err(DomainError::InvalidState(format!(
                    "payment {} is {status}, only completed payments can be refunded",
                    self.id
                )));
            }
        }
        if let Some(requested_at) = self.refund_requested_at
            && now - requested_at < REFUND_CLAIM_TIMEOUT
        {
            return Err(DomainError::InvalidState(format!(
                "a refund of payment {} is already in progress",
                self.id
            )));
        }

        let mut next = self.clone();
        next.refund_requested_at = Some(now);
        next.updated_at = now;
        Ok(next)
    }

    /// Returns a copy moved to refunded with the claim cleared.
    ///
    /// A payment a gateway callback already moved to refunded keeps its
    /// status and timestamp and only drops the claim.
    pub fn complete_refund(&self, now: DateTime<Utc>) -> Result<Self> {
        if self.refund_requested_at.is_none() {
            return Err(DomainError::InvalidState(format!(
                "payment {} has no refund in progress",
                self.id
            )));
        }

        let mut next = self.clone();
        next.refund_requested_at = None;
        next.updated_at = now;
        match self.status {
            PaymentStatus::Completed => {
                next.status = PaymentStatus::Refunded;
                next.refunded_at = Some(now);
            }
            PaymentStatus::Refunded => {}
            status => return Err(DomainError::invalid_transition(status, PaymentStatus::Refunded)),
        }
        Ok(next)
    }

    /// Returns a copy without the refund claim, or `None` if there is none.
    pub fn release_refund_claim(&self, now: DateTime<Utc>) -> Option<Self> {
        self.refund_requested_at?;
        let mut next = self.clone();
        next.refund_requested_at = None;
        next.updated_at = now;
        Some(next)
    }
}

/// How long a refund claim blocks other refunds of the same payment.
pub const REFUND_CLAIM_TIMEOUT: TimeDelta = TimeDelta::minutes(5);

impl Record for Payment {
    const TABLE: Table = Table::Payments;

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn owner_id(&self) -> Option<&str> {
        Some(self.user_id.as_str())
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.order_id)
    }

    fn external_ref(&self) -> Option<&str> {
        Some(&self.gateway_intent_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn cache_key(id: &str) -> String {
        format!("payment:{id}")
    }
}

/// Default reason sent to the gateway with a refund.
pub const DEFAULT_REFUND_REASON: &str = "requested_by_customer";

/// Money returned against a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    /// Gateway refund id.
    pub id: RefundId,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub currency: String,
    /// The gateway's refund status, e.g. `succeeded`.
    pub status: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Refund {
    const TABLE: Table = Table::Refunds;

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn parent_id(&self) -> Option<&str> {
        Some(self.payment_id.as_str())
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn cache_key(id: &str) -> String {
        format!("refund:{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Payment {
        let now = Utc::now();
        Payment {
            id: PaymentId::new("pi_0001"),
            order_id: "order-1".to_string(),
            user_id: UserId::new("user-1"),
            amount: "99.99".parse().unwrap(),
            currency: "usd".to_string(),
            status: PaymentStatus::Pending,
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
    fn test_settle_completed_stamps_once() {
        let now = Utc::now();
        let completed = pending()
            .settle(PaymentStatus::Completed, None, now)
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, PaymentStatus::Completed);
        assert_eq!(completed.completed_at, Some(now));

        let again = completed
            .settle(PaymentStatus::Completed, None, Utc::now())
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_settle_failed_keeps_reason() {
        let failed = pending()
            .settle(PaymentStatus::Failed, Some("card_declined"), Utc::now())
            .unwrap()
            .unwrap();
        assert!(failed.failed_at.is_some());
        assert_eq!(failed.failure_reason.as_deref(), Some("card_declined"));
    }

    #[test]
    fn test_settle_rejects_invalid_transition() {
        let result = pending().settle(PaymentStatus::Refunded, None, Utc::now());
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));

        let failed = pending()
            .settle(PaymentStatus::Failed, None, Utc::now())
            .unwrap()
            .unwrap();
        assert!(
            failed
                .settle(PaymentStatus::Completed, None, Utc::now())
                .is_err()
        );
    }

    #[test]
    fn test_stale_completion_after_refund_is_a_no_op() {
        let now = Utc::now();
        let refunded = pending()
            .settle(PaymentStatus::Completed, None, now)
            .unwrap()
            .unwrap()
            .settle(PaymentStatus::Refunded, None, now)
            .unwrap()
            .unwrap();

        assert!(
            refunded
                .settle(PaymentStatus::Completed, None, now)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_amount_and_currency_survive_settlement() {
        let payment = pending();
        let completed = payment
            .settle(PaymentStatus::Completed, None, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(completed.amount, payment.amount);
        assert_eq!(completed.currency, payment.currency);
    }

    fn completed() -> Payment {
        pending()
            .settle(PaymentStatus::Completed, None, Utc::now())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_refund_claim_is_exclusive() {
        let now = Utc::now();
        let claimed = completed().claim_refund(now).unwrap();
        assert_eq!(claimed.refund_requested_at, Some(now));
        assert_eq!(claimed.status, PaymentStatus::Completed);

        let second = claimed.claim_refund(now + TimeDelta::seconds(1));
        assert!(matches!(second, Err(DomainError::InvalidState(_))));

        let abandoned = claimed.claim_refund(now + REFUND_CLAIM_TIMEOUT);
        assert!(abandoned.is_ok());
    }

    #[test]
    fn test_refund_claim_requires_completed() {
        let now = Utc::now();
        assert!(matches!(
            pending().claim_refund(now),
            Err(DomainError::InvalidState(_))
        ));

        let refunded = completed()
            .claim_refund(now)
            .unwrap()
            .complete_refund(now)
            .unwrap();
        let again = refunded.claim_refund(now);
        assert!(
            matches!(&again, Err(DomainError::InvalidState(m)) if m.contains("already refunded"))
        );
    }

    #[test]
    fn test_complete_refund_moves_to_refunded() {
        let now = Utc::now();
        let refunded = completed()
            .claim_refund(now)
            .unwrap()
            .complete_refund(now)
            .unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.refunded_at, Some(now));
        assert!(refunded.refund_requested_at.is_none());

        assert!(matches!(
            completed().complete_refund(now),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn test_complete_refund_after_callback_keeps_status() {
        let claimed_at = Utc::now();
        let callback_at = claimed_at + TimeDelta::seconds(1);
        let settled = completed()
            .claim_refund(claimed_at)
            .unwrap()
            .settle(PaymentStatus::Refunded, None, callback_at)
            .unwrap()
            .unwrap();

        let finished = settled
            .complete_refund(callback_at + TimeDelta::seconds(1))
            .unwrap();
        assert_eq!(finished.status, PaymentStatus::Refunded);
        assert_eq!(finished.refunded_at, Some(callback_at));
        assert!(finished.refund_requested_at.is_none());
    }

    #[test]
    fn test_release_refund_claim() {
        let now = Utc::now();
        assert!(completed().release_refund_claim(now).is_none());

        let released = completed()
            .claim_refund(now)
            .unwrap()
            .release_refund_claim(now)
            .unwrap();
        assert!(released.refund_requested_at.is_none());
        assert!(released.claim_refund(now).is_ok());
    }

    #[test]
    fn test_record_columns() {
        let payment = pending();
        assert_eq!(payment.owner_id(), Some("user-1"));
        assert_eq!(payment.parent_id(), Some("order-1"));
        assert_eq!(payment.external_ref(), Some("pi_0001"));
        assert_eq!(Payment::cache_key("pi_0001"), "payment:pi_0001");
    }
}
