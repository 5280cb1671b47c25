//! Keeps orders in step with their payments.

use std::sync::Arc;
use std::time::Duration;

use cache::Cache;
use common::{OrderId, PaymentId};
use events::{Exchange, PublishedMessage, Subscription};
use ledger::LedgerStore;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::error::{DomainError, Result};

use super::OrderService;

const PAYMENT_COMPLETED: &str = "payment.completed";

/// Consumer group the order service subscribes to payment events under.
pub const PAYMENT_SYNC_GROUP: &str = "order-payment-sync";

/// Attempts per message before it is given up on.
const MAX_HANDLE_ATTEMPTS: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct CompletedPayment {
    payment: PaymentRef,
}

#[derive(Debug, Deserialize)]
struct PaymentRef {
    id: PaymentId,
    order_id: String,
}

/// Subscriber that confirms an order when its payment completes.
///
/// Delivery is at-least-once; recording the same payment twice is a no-op,
/// so redelivered messages confirm the order only once.
pub struct PaymentSync<S: LedgerStore, C: Cache> {
    orders: Arc<OrderService<S, C>>,
}

impl<S: LedgerStore, C: Cache> Clone for PaymentSync<S, C> {
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
        }
    }
}

impl<S: LedgerStore, C: Cache> PaymentSync<S, C> {
    pub fn new(orders: Arc<OrderService<S, C>>) -> Self {
        Self { orders }
    }

    /// Handles one bus message. Returns true if an order was confirmed.
    pub async fn handle(&self, message: &PublishedMessage) -> Result<bool> {
        if message.exchange != Exchange::Payments.as_str()
            || message.routing_key != PAYMENT_COMPLETED
        {
            return Ok(false);
        }

        let completed: CompletedPayment = message.envelope.decode()?;
        let payment = completed.payment;
        let Ok(order_id) = OrderId::parse(&payment.order_id) else {
            tracing::warn!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                "Completed payment references an unknown order id format"
            );
            return Ok(false);
        };

        match self.orders.record_payment(order_id, &payment.id).await {
            Ok(result) => Ok(result.changed),
            Err(DomainError::NotFound { .. }) => {
                tracing::warn!(%order_id, payment_id = %payment.id, "Order for completed payment not found");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Handles a message, retrying failures with a doubling delay.
    async fn handle_with_retry(&self, message: &PublishedMessage) -> Result<bool> {
        let mut attempt = 1;
        loop {
            match self.handle(message).await {
                Ok(changed) => return Ok(changed),
                Err(e) if attempt < MAX_HANDLE_ATTEMPTS => {
                    tracing::warn!(
                        event_type = %message.routing_key,
                        attempt,
                        error = %e,
                        "Retrying payment event"
                    );
                    tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Consumes deliveries until the subscription closes.
    ///
    /// A delivery is acked once it was applied or given up on.
    pub fn spawn(self, mut subscription: Subscription) -> JoinHandle<()>
    where
        S: 'static,
        C: 'static,
    {
        tokio::spawn(async move {
            while let Some(delivery) = subscription.next().await {
                if let Err(e) = self.handle_with_retry(&delivery.message).await {
                    metrics::counter!("payment_sync_failures_total").increment(1);
                    tracing::error!(
                        event_type = %delivery.message.routing_key,
                        error = %e,
                        "Failed to apply payment event to order"
                    );
                }
                delivery.ack();
            }
        })
    }
}
