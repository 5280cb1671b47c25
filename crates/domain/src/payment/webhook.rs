//! Gateway webhook ingestion.

use cache::Cache;
use common::PaymentId;
use gateway::{PaymentGateway, WebhookEvent};
use ledger::LedgerStore;

use crate::error::{DomainError, Result};

use super::{PaymentService, PaymentStatus};

/// Source name under which processed gateway event ids are recorded.
pub const WEBHOOK_SOURCE: &str = "stripe";

/// Gateway event types the payment service reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventKind {
    IntentSucceeded,
    IntentFailed,
    ChargeRefunded,
    Other,
}

impl GatewayEventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => GatewayEventKind::IntentSucceeded,
            "payment_intent.payment_failed" => GatewayEventKind::IntentFailed,
            "charge.refunded" => GatewayEventKind::ChargeRefunded,
            _ => GatewayEventKind::Other,
        }
    }

    /// Returns the payment status the event implies, if any.
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            GatewayEventKind::IntentSucceeded => Some(PaymentStatus::Completed),
            GatewayEventKind::IntentFailed => Some(PaymentStatus::Failed),
            GatewayEventKind::ChargeRefunded => Some(PaymentStatus::Refunded),
            GatewayEventKind::Other => None,
        }
    }

    /// Label used for the received-webhooks counter.
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEventKind::IntentSucceeded => "payment_intent.succeeded",
            GatewayEventKind::IntentFailed => "payment_intent.payment_failed",
            GatewayEventKind::ChargeRefunded => "charge.refunded",
            GatewayEventKind::Other => "other",
        }
    }
}

/// What a webhook delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The payment changed status.
    Applied,
    /// The payment already reflected the event.
    AlreadyApplied,
    /// The event id was processed before.
    Duplicate,
    /// The event type is not one the service acts on.
    Ignored,
}

fn failure_reason(event: &WebhookEvent) -> Option<String> {
    let error = event.data.object.get("last_payment_error")?;
    error
        .get("message")
        .or_else(|| error.get("code"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

impl<S: LedgerStore, C: Cache, G: PaymentGateway> PaymentService<S, C, G> {
    /// Verifies and applies a gateway webhook delivery.
    ///
    /// An event id is recorded as processed only after its transition
    /// succeeded, so a delivery that fails here is retried by the gateway.
    #[tracing::instrument(skip(self, payload, signature))]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DomainError::Authentication("missing signature header".to_string()))?;
        let event = self.verifier.verify(payload, signature)?;

        let kind = GatewayEventKind::parse(&event.event_type);
        metrics::counter!("webhooks_received_total", "type" => kind.as_str()).increment(1);

        let Some(target) = kind.target_status() else {
            tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        };

        let store = self.payments.store();
        if store.is_processed(WEBHOOK_SOURCE, &event.id).await? {
            tracing::debug!(event_id = %event.id, "Duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate);
        }

        let intent_id = event.intent_id().ok_or_else(|| {
            DomainError::validation(format!(
                "event {} does not reference a payment intent",
                event.id
            ))
        })?;
        let payment_id = PaymentId::new(intent_id);

        let result = self
            .settle(&payment_id, target, failure_reason(&event), None)
            .await?;
        store.mark_processed(WEBHOOK_SOURCE, &event.id).await?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            %payment_id,
            changed = result.changed,
            "Webhook processed"
        );
        Ok(if result.changed {
            WebhookOutcome::Applied
        } else {
            WebhookOutcome::AlreadyApplied
        })
    }
}
