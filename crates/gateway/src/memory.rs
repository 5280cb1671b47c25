//! Scriptable in-memory gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{GatewayError, IntentCreated, IntentStatus, PaymentGateway, RefundCreated, Result};

#[derive(Debug, Clone)]
struct Intent {
    amount: Money,
    currency: String,
    metadata: HashMap<String, String>,
    status: IntentStatus,
    refunded: Money,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, Intent>,
    next_intent: u32,
    next_refund: u32,
    refunds_by_key: HashMap<String, RefundCreated>,
    refund_calls: usize,
    refund_delay: Duration,
    unavailable: bool,
    decline_confirm: bool,
}

/// In-memory gateway for tests and local runs.
///
/// Intent ids are sequential (`pi_0001`, `pi_0002`, ...), as are refund ids.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `Unavailable` (or succeed again).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Makes confirmations decline (or succeed again).
    pub async fn set_decline_confirm(&self, decline: bool) {
        self.state.write().await.decline_confirm = decline;
    }

    /// Delays every refund call, to widen race windows in tests.
    pub async fn set_refund_delay(&self, delay: Duration) {
        self.state.write().await.refund_delay = delay;
    }

    /// Returns how many refund requests reached the gateway.
    pub async fn refund_calls(&self) -> usize {
        self.state.read().await.refund_calls
    }

    /// Returns the number of intents created.
    pub async fn intent_count(&self) -> usize {
        self.state.read().await.intents.len()
    }

    /// Returns the metadata an intent was created with.
    pub async fn intent_metadata(&self, intent_id: &str) -> Option<HashMap<String, String>> {
        self.state
            .read()
            .await
            .intents
            .get(intent_id)
            .map(|i| i.metadata.clone())
    }

    /// Returns the total refunded against an intent.
    pub async fn refunded_amount(&self, intent_id: &str) -> Option<Money> {
        self.state
            .read()
            .await
            .intents
            .get(intent_id)
            .map(|i| i.refunded)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<IntentCreated> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(GatewayError::Unavailable("gateway offline".to_string()));
        }
        if !amount.is_positive() {
            return Err(GatewayError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }

        state.next_intent += 1;
        let intent_id = format!("pi_{:04}", state.next_intent);
        let client_secret = format!("{intent_id}_secret_{}", Uuid::new_v4().simple());
        state.intents.insert(
            intent_id.clone(),
            Intent {
                amount,
                currency: currency.to_string(),
                metadata: metadata.clone(),
                status: IntentStatus::RequiresAction,
                refunded: Money::zero(),
            },
        );

        Ok(IntentCreated {
            intent_id,
            client_secret,
        })
    }

    async fn confirm_intent(&self, intent_id: &str, _payment_method: &str) -> Result<IntentStatus> {
        let mut state = self.state.write().await;
        if state.unavailable {
            return Err(GatewayError::Unavailable("gateway offline".to_string()));
        }
        let decline = state.decline_confirm;

        let intent = state.intents.get_mut(intent_id).ok_or_else(|| {
            GatewayError::InvalidRequest(format!("No such payment_intent: '{intent_id}'"))
        })?;

        // A settled intent keeps its outcome.
        if matches!(
            intent.status,
            IntentStatus::Succeeded | IntentStatus::Failed { .. }
        ) {
            return Ok(intent.status.clone());
        }

        intent.status = if decline {
            IntentStatus::Failed {
                reason: Some("card_declined".to_string()),
            }
        } else {
            IntentStatus::Succeeded
        };
        Ok(intent.status.clone())
    }

    async fn create_refund(
        &self,
        intent_id: &str,
        amount: Option<Money>,
        _reason: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<RefundCreated> {
        let delay = self.state.read().await.refund_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        state.refund_calls += 1;
        if state.unavailable {
            return Err(GatewayError::Unavailable("gateway offline".to_string()));
        }
        if let Some(previous) = idempotency_key.and_then(|key| state.refunds_by_key.get(key)) {
            return Ok(previous.clone());
        }

        let intent = state.intents.get_mut(intent_id).ok_or_else(|| {
            GatewayError::InvalidRequest(format!("No such payment_intent: '{intent_id}'"))
        })?;
        if !intent.status.is_success() {
            return Err(GatewayError::InvalidRequest(format!(
                "payment_intent '{intent_id}' has not succeeded"
            )));
        }

        let remaining = intent
            .amount
            .checked_sub(intent.refunded)
            .unwrap_or_else(Money::zero);
        let amount = amount.unwrap_or(remaining);
        if !amount.is_positive() || amount > remaining {
            return Err(GatewayError::InvalidRequest(format!(
                "refund amount {amount} exceeds refundable {remaining}"
            )));
        }
        intent.refunded = intent.refunded.checked_add(amount).ok_or_else(|| {
            GatewayError::InvalidRequest(format!("refund amount {amount} is out of range"))
        })?;
        let currency = intent.currency.clone();

        state.next_refund += 1;
        let refund = RefundCreated {
            refund_id: format!("re_{:04}", state.next_refund),
            amount,
            currency,
            status: "succeeded".to_string(),
        };
        if let Some(key) = idempotency_key {
            state.refunds_by_key.insert(key.to_string(), refund.clone());
        }
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn sequential_intent_ids() {
        let gateway = InMemoryGateway::new();
        let metadata = HashMap::new();

        let i1 = gateway
            .create_intent(money("10"), "usd", &metadata)
            .await
            .unwrap();
        let i2 = gateway
            .create_intent(money("20"), "usd", &metadata)
            .await
            .unwrap();

        assert_eq!(i1.intent_id, "pi_0001");
        assert_eq!(i2.intent_id, "pi_0002");
        assert!(i1.client_secret.starts_with("pi_0001_secret_"));
        assert_eq!(gateway.intent_count().await, 2);
    }

    #[tokio::test]
    async fn confirm_then_partial_and_full_refund() {
        let gateway = InMemoryGateway::new();
        let intent = gateway
            .create_intent(money("99.99"), "usd", &HashMap::new())
            .await
            .unwrap();

        let status = gateway
            .confirm_intent(&intent.intent_id, "pm_card_visa")
            .await
            .unwrap();
        assert_eq!(status, IntentStatus::Succeeded);

        let refund = gateway
            .create_refund(&intent.intent_id, Some(money("25.00")), None, None)
            .await
            .unwrap();
        assert_eq!(refund.refund_id, "re_0001");
        assert_eq!(refund.amount, money("25.00"));
        assert_eq!(refund.currency, "usd");

        let rest = gateway
            .create_refund(&intent.intent_id, None, Some("duplicate"), None)
            .await
            .unwrap();
        assert_eq!(rest.amount, money("74.99"));
        assert_eq!(
            gateway.refunded_amount(&intent.intent_id).await,
            Some(money("99.99"))
        );
    }

    #[tokio::test]
    async fn declined_confirmation() {
        let gateway = InMemoryGateway::new();
        gateway.set_decline_confirm(true).await;
        let intent = gateway
            .create_intent(money("5"), "usd", &HashMap::new())
            .await
            .unwrap();

        let status = gateway
            .confirm_intent(&intent.intent_id, "pm_card_chargeDeclined")
            .await
            .unwrap();
        assert!(matches!(status, IntentStatus::Failed { .. }));

        let refund = gateway.create_refund(&intent.intent_id, None, None, None).await;
        assert!(matches!(refund, Err(GatewayError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn repeated_idempotency_key_refunds_once() {
        let gateway = InMemoryGateway::new();
        let intent = gateway
            .create_intent(money("40.00"), "usd", &HashMap::new())
            .await
            .unwrap();
        gateway
            .confirm_intent(&intent.intent_id, "pm_card_visa")
            .await
            .unwrap();

        let key = Some("refund-pi_0001");
        let first = gateway
            .create_refund(&intent.intent_id, Some(money("10.00")), None, key)
            .await
            .unwrap();
        let second = gateway
            .create_refund(&intent.intent_id, Some(money("10.00")), None, key)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.refund_calls().await, 2);
        assert_eq!(
            gateway.refunded_amount(&intent.intent_id).await,
            Some(money("10.00"))
        );
    }

    #[tokio::test]
    async fn unavailable_gateway_fails_calls() {
        let gateway = InMemoryGateway::new();
        gateway.set_unavailable(true).await;

        let result = gateway
            .create_intent(money("5"), "usd", &HashMap::new())
            .await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
        assert_eq!(gateway.intent_count().await, 0);
    }

    #[tokio::test]
    async fn metadata_is_kept() {
        let gateway = InMemoryGateway::new();
        let metadata = HashMap::from([("orderId".to_string(), "o-1".to_string())]);
        let intent = gateway
            .create_intent(money("5"), "usd", &metadata)
            .await
            .unwrap();

        assert_eq!(
            gateway.intent_metadata(&intent.intent_id).await,
            Some(metadata)
        );
    }
}
