use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::{EventEnvelope, Exchange, PublishedMessage, Result};

/// Delivery options for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Ask the broker to persist the message.
    pub persistent: bool,
}

impl PublishOptions {
    pub fn persistent() -> Self {
        Self { persistent: true }
    }

    pub fn transient() -> Self {
        Self { persistent: false }
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self::persistent()
    }
}

/// A received message awaiting acknowledgement.
///
/// Transports that track consumer progress record it only when the delivery
/// is acked; a delivery dropped without [`Delivery::ack`] is not marked
/// consumed.
#[derive(Debug)]
pub struct Delivery {
    pub message: PublishedMessage,
    ack: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// A delivery that needs no acknowledgement.
    pub fn new(message: PublishedMessage) -> Self {
        Self { message, ack: None }
    }

    /// A delivery whose ack is reported on `ack`.
    pub fn with_ack(message: PublishedMessage, ack: oneshot::Sender<()>) -> Self {
        Self {
            message,
            ack: Some(ack),
        }
    }

    /// Marks the message as handled.
    pub fn ack(mut self) {
        if let Some(ack) = self.ack.take() {
            // The transport may have shut down already.
            let _ = ack.send(());
        }
    }
}

/// The receiving end of a subscription.
///
/// Ends when the bus side shuts down.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { receiver }
    }

    /// Waits for the next delivery, or `None` once the subscription closed.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// A topic-addressed message transport.
///
/// Messages are published to a named exchange with a routing key.
/// Subscribers sharing a group name split the messages of their exchanges
/// between them where the transport supports it; delivery is at least once.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
        options: PublishOptions,
    ) -> Result<()>;

    /// Starts receiving messages published to `exchanges`.
    async fn subscribe(&self, group: &str, exchanges: &[Exchange]) -> Result<Subscription>;
}

#[async_trait]
impl<T: EventBus + ?Sized> EventBus for Arc<T> {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
        options: PublishOptions,
    ) -> Result<()> {
        (**self)
            .publish(exchange, routing_key, envelope, options)
            .await
    }

    async fn subscribe(&self, group: &str, exchanges: &[Exchange]) -> Result<Subscription> {
        (**self).subscribe(group, exchanges).await
    }
}
