use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::{
    BusError, Delivery, EventBus, EventEnvelope, Exchange, PublishOptions, Result, Subscription,
};

/// A message as it was handed to the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub envelope: EventEnvelope,
    pub persistent: bool,
}

struct Subscriber {
    exchanges: Vec<Exchange>,
    sender: mpsc::UnboundedSender<Delivery>,
}

impl Subscriber {
    fn wants(&self, exchange: &str) -> bool {
        self.exchanges.iter().any(|e| e.as_str() == exchange)
    }
}

/// In-process event bus.
///
/// Every published message is queued for each subscriber of its exchange
/// and kept in a log that tests can inspect. Queues are unbounded, so a slow
/// subscriber never misses a message. Groups are not shared: every
/// subscription sees every message. Publishing with no subscribers is fine.
#[derive(Clone)]
pub struct InMemoryEventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    published: Arc<RwLock<Vec<PublishedMessage>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            published: Arc::new(RwLock::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes subsequent publishes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns every message published so far.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.read().await.clone()
    }

    /// Returns the messages published with a given routing key.
    pub async fn published_with_key(&self, routing_key: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .await
            .iter()
            .filter(|m| m.routing_key == routing_key)
            .cloned()
            .collect()
    }

    /// Clears the published-message log.
    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
        options: PublishOptions,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("bus is failing".to_string()));
        }

        let message = PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            envelope: envelope.clone(),
            persistent: options.persistent,
        };
        self.published.write().await.push(message.clone());

        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|subscriber| {
            !subscriber.wants(exchange)
                || subscriber
                    .sender
                    .send(Delivery::new(message.clone()))
                    .is_ok()
        });
        Ok(())
    }

    async fn subscribe(&self, group: &str, exchanges: &[Exchange]) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(Subscriber {
            exchanges: exchanges.to_vec(),
            sender,
        });
        tracing::debug!(group, ?exchanges, "In-memory subscription opened");
        Ok(Subscription::new(receiver))
    }
}
