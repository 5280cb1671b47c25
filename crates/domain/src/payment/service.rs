//! Payment service orchestrating the gateway, the ledger and the cache.

use std::time::Duration;

use cache::Cache;
use chrono::Utc;
use common::{PaymentId, RefundId};
use events::EventPublisher;
use gateway::{IntentStatus, PaymentGateway, WebhookVerifier};
use ledger::{LedgerStore, RowQuery, Table};

use crate::error::{DomainError, Result};
use crate::pagination::Page;
use crate::record::DomainEvent;
use crate::repository::{Repository, WriteResult};

use super::{
    CreateIntent, CreatedIntent, DEFAULT_REFUND_REASON, Payment, PaymentEvent, PaymentFilter,
    PaymentStatus, Refund, RefundPayment,
};

/// Service for managing payments.
///
/// Gateway calls are made without holding anything; the local transition is
/// decided against the store afterwards, so a gateway callback racing with a
/// caller settles the payment exactly once.
pub struct PaymentService<S: LedgerStore, C: Cache, G: PaymentGateway> {
    pub(super) payments: Repository<S, C, Payment>,
    refunds: Repository<S, C, Refund>,
    gateway: G,
    publisher: EventPublisher,
    pub(super) verifier: WebhookVerifier,
}

impl<S, C, G> PaymentService<S, C, G>
where
    S: LedgerStore + Clone,
    C: Cache + Clone,
    G: PaymentGateway,
{
    /// Creates a new payment service.
    pub fn new(
        store: S,
        cache: C,
        gateway: G,
        publisher: EventPublisher,
        verifier: WebhookVerifier,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            payments: Repository::new(store.clone(), cache.clone(), cache_ttl),
            refunds: Repository::new(store, cache, cache_ttl),
            gateway,
            publisher,
            verifier,
        }
    }
}

impl<S: LedgerStore, C: Cache, G: PaymentGateway> PaymentService<S, C, G> {
    /// Returns a reference to the payment repository.
    pub fn repository(&self) -> &Repository<S, C, Payment> {
        &self.payments
    }

    /// Returns a reference to the gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Opens a gateway intent and records a pending payment for it.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, amount = %cmd.amount))]
    pub async fn create_intent(&self, cmd: CreateIntent) -> Result<CreatedIntent> {
        cmd.validate()?;
        let currency = cmd.currency();

        let mut metadata = cmd.metadata;
        metadata.insert("orderId".to_string(), cmd.order_id.clone());
        metadata.insert("userId".to_string(), cmd.user_id.to_string());

        let intent = self
            .gateway
            .create_intent(cmd.amount, &currency, &metadata)
            .await?;

        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::new(intent.intent_id.clone()),
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            amount: cmd.amount,
            currency,
            status: PaymentStatus::Pending,
            gateway_intent_id: intent.intent_id,
            metadata,
            failure_reason: None,
            completed_at: None,
            failed_at: None,
            refunded_at: None,
            refund_requested_at: None,
            created_at: now,
            updated_at: now,
        };
        self.payments.create(&payment).await?;
        self.payments.cache_put(&payment).await;

        metrics::counter!("payments_total", "status" => PaymentStatus::Pending.as_str())
            .increment(1);
        metrics::histogram!("payment_amount").record(payment.amount.as_f64());
        tracing::info!(payment_id = %payment.id, "Payment intent created");

        self.publish(PaymentEvent::intent_created(&payment)).await;
        Ok(CreatedIntent {
            payment,
            client_secret: intent.client_secret,
        })
    }

    /// Confirms a payment with the gateway and records the outcome.
    ///
    /// A payment that is no longer pending is returned unchanged without
    /// calling the gateway.
    #[tracing::instrument(skip(self, payment_method))]
    pub async fn confirm(&self, payment_id: &PaymentId, payment_method: &str) -> Result<Payment> {
        if payment_method.trim().is_empty() {
            return Err(DomainError::validation("payment method is required"));
        }

        let payment = self.payments.get(payment_id.as_str()).await?;
        if payment.status != PaymentStatus::Pending {
            let (stored, _) = self.payments.load(payment_id.as_str()).await?;
            if stored.status != PaymentStatus::Pending {
                tracing::debug!(%payment_id, status = %stored.status, "Payment already settled");
                return Ok(stored);
            }
        }

        let outcome = self
            .gateway
            .confirm_intent(&payment.gateway_intent_id, payment_method)
            .await?;

        let (target, reason) = match outcome {
            IntentStatus::Succeeded => (PaymentStatus::Completed, None),
            IntentStatus::Failed { reason } => (PaymentStatus::Failed, reason),
            other => (PaymentStatus::Failed, Some(intent_status_reason(&other))),
        };

        let result = self.settle(payment_id, target, reason, None).await?;
        Ok(result.record)
    }

    /// Refunds a completed payment, in full or in part.
    ///
    /// The payment moves to refunded after the first refund. The caller first
    /// claims the refund with a conditional write, so of two concurrent
    /// requests only one reaches the gateway; the other gets `InvalidState`.
    /// The gateway call carries an idempotency key derived from the claim.
    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        payment_id: &PaymentId,
        request: RefundPayment,
    ) -> Result<(Payment, Refund)> {
        let (payment, _) = self.payments.load(payment_id.as_str()).await?;
        payment.claim_refund(Utc::now())?;

        let amount = request.amount.unwrap_or(payment.amount);
        if !amount.is_positive() {
            return Err(DomainError::validation(
                "refund amount must be greater than 0",
            ));
        }
        if amount > payment.amount {
            return Err(DomainError::validation(format!(
                "refund amount {amount} exceeds payment amount {}",
                payment.amount
            )));
        }
        let reason = request
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string());

        let claim = self
            .payments
            .execute(payment_id.as_str(), |current| {
                current.claim_refund(Utc::now()).map(Some)
            })
            .await?;
        let idempotency_key = format!("refund-{payment_id}-{}", claim.version);

        let created = match self
            .gateway
            .create_refund(
                &claim.record.gateway_intent_id,
                Some(amount),
                Some(&reason),
                Some(&idempotency_key),
            )
            .await
        {
            Ok(created) => created,
            Err(e) => {
                self.release_refund_claim(payment_id, &claim.record).await;
                return Err(e.into());
            }
        };

        let result = self
            .payments
            .execute(payment_id.as_str(), |current| {
                current.complete_refund(Utc::now()).map(Some)
            })
            .await?;

        let refund = Refund {
            id: RefundId::new(created.refund_id),
            payment_id: payment_id.clone(),
            amount: created.amount,
            currency: created.currency,
            status: created.status,
            reason,
            created_at: Utc::now(),
        };
        self.refunds.create(&refund).await?;
        tracing::info!(%payment_id, refund_id = %refund.id, amount = %refund.amount, "Refund issued");

        if result.before.status == result.record.status {
            tracing::debug!(%payment_id, "Payment was already marked refunded");
        } else {
            self.announce(payment_id, &result, Some(&refund)).await;
        }
        Ok((result.record, refund))
    }

    /// Drops the claim held by `claimed`, unless another caller took it over.
    async fn release_refund_claim(&self, payment_id: &PaymentId, claimed: &Payment) {
        let released = self
            .payments
            .execute(payment_id.as_str(), |current| {
                if current.refund_requested_at != claimed.refund_requested_at {
                    return Ok(None);
                }
                Ok(current.release_refund_claim(Utc::now()))
            })
            .await;
        if let Err(e) = released {
            tracing::warn!(%payment_id, error = %e, "Failed to release refund claim");
        }
    }

    /// Loads a payment by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, payment_id: &PaymentId) -> Result<Payment> {
        self.payments.get(payment_id.as_str()).await
    }

    /// Lists payments matching a filter, newest first. Always reads the store.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: PaymentFilter) -> Result<Page<Payment>> {
        let mut query = RowQuery::new(Table::Payments)
            .limit(filter.window.limit as usize)
            .offset(filter.window.offset as usize);
        if let Some(user_id) = &filter.user_id {
            query = query.owner_id(user_id.as_str());
        }
        if let Some(order_id) = &filter.order_id {
            query = query.parent_id(order_id.as_str());
        }
        if let Some(status) = filter.status {
            query = query.status(status.as_str());
        }

        let (items, total) = self.payments.query(query).await?;
        Ok(Page {
            items,
            total,
            page: filter.window.offset / filter.window.limit.max(1) + 1,
            limit: filter.window.limit,
        })
    }

    /// Lists the refunds issued against a payment, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_refunds(&self, payment_id: &PaymentId) -> Result<Vec<Refund>> {
        self.payments.load(payment_id.as_str()).await?;

        let query = RowQuery::new(Table::Refunds).parent_id(payment_id.as_str());
        let (refunds, _) = self.refunds.query(query).await?;
        Ok(refunds)
    }

    /// Moves a payment to `target` unless it already reflects it, and
    /// publishes the matching event when something changed.
    pub(super) async fn settle(
        &self,
        payment_id: &PaymentId,
        target: PaymentStatus,
        failure_reason: Option<String>,
        refund: Option<&Refund>,
    ) -> Result<WriteResult<Payment>> {
        let result = self
            .payments
            .execute(payment_id.as_str(), |payment| {
                payment.settle(target, failure_reason.as_deref(), Utc::now())
            })
            .await?;

        if result.changed {
            self.announce(payment_id, &result, refund).await;
        } else {
            tracing::debug!(%payment_id, status = %result.record.status, "Payment already settled");
        }
        Ok(result)
    }

    /// Records and publishes a status change.
    async fn announce(
        &self,
        payment_id: &PaymentId,
        result: &WriteResult<Payment>,
        refund: Option<&Refund>,
    ) {
        let status = result.record.status;
        metrics::counter!("payments_total", "status" => status.as_str()).increment(1);
        tracing::info!(
            %payment_id,
            from = %result.before.status,
            to = %status,
            "Payment status changed"
        );
        if let Some(event) = PaymentEvent::settled(&result.record, refund) {
            self.publish(event).await;
        }
    }

    async fn publish(&self, event: PaymentEvent) {
        self.publisher
            .publish(event.exchange(), event.event_type(), &event)
            .await;
    }
}

fn intent_status_reason(status: &IntentStatus) -> String {
    match status {
        IntentStatus::Succeeded => "succeeded",
        IntentStatus::Processing => "processing",
        IntentStatus::RequiresAction => "requires_action",
        IntentStatus::Canceled => "canceled",
        IntentStatus::Failed { .. } => "failed",
    }
    .to_string()
}
