//! Kafka-protocol event bus (Apache Kafka, Redpanda).
//!
//! Each exchange is a topic and the routing key is the message key, so the
//! events of one type stay ordered within their partition. Consumers commit
//! an offset only after the subscriber acked the delivery.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::sync::{mpsc, oneshot};

use crate::{
    BusError, Delivery, EventBus, EventEnvelope, Exchange, PublishOptions, PublishedMessage,
    Result, Subscription,
};

const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Connection settings for [`KafkaEventBus`].
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    /// How long a publish waits for the broker.
    pub timeout: Duration,
    /// Where a new consumer group starts reading: `earliest` or `latest`.
    pub auto_offset_reset: String,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            timeout: Duration::from_secs(5),
            auto_offset_reset: "earliest".to_string(),
        }
    }
}

/// Event bus over a Kafka-compatible broker.
pub struct KafkaEventBus {
    producer: FutureProducer,
    config: KafkaConfig,
}

impl KafkaEventBus {
    /// Creates the producer. Brokers are contacted lazily.
    pub fn new(config: KafkaConfig) -> Result<Self> {
        let timeout_ms = config.timeout.as_millis().to_string();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", &timeout_ms)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| BusError::Unavailable(format!("failed to create producer: {e}")))?;

        tracing::info!(brokers = %config.brokers, "Kafka event bus created");
        Ok(Self { producer, config })
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    fn consumer(&self, group: &str) -> Result<StreamConsumer> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BusError::Unavailable(format!("failed to create consumer: {e}")))
    }
}

/// Turns a consumed record back into the message that was published.
fn decode(message: &BorrowedMessage<'_>) -> Result<PublishedMessage> {
    let payload = message
        .payload()
        .ok_or_else(|| BusError::Malformed("message has no payload".to_string()))?;
    let envelope: EventEnvelope = serde_json::from_slice(payload)?;
    let routing_key = message
        .key()
        .and_then(|key| std::str::from_utf8(key).ok())
        .map(str::to_string)
        .unwrap_or_else(|| envelope.event_type.clone());

    Ok(PublishedMessage {
        exchange: message.topic().to_string(),
        routing_key,
        envelope,
        persistent: true,
    })
}

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
        tracing::warn!(
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            error = %e,
            "Failed to commit offset, message may be redelivered"
        );
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
        _options: PublishOptions,
    ) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        let record = FutureRecord::to(exchange).payload(&payload).key(routing_key);

        match self
            .producer
            .send(record, Timeout::After(self.config.timeout))
            .await
        {
            Ok((partition, offset)) => {
                tracing::trace!(exchange, routing_key, partition, offset, "Message delivered to broker");
                Ok(())
            }
            Err((e, _)) => Err(BusError::Unavailable(format!(
                "failed to publish to {exchange}: {e}"
            ))),
        }
    }

    async fn subscribe(&self, group: &str, exchanges: &[Exchange]) -> Result<Subscription> {
        let consumer = self.consumer(group)?;
        let topics: Vec<&str> = exchanges.iter().map(Exchange::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| BusError::Unavailable(format!("failed to subscribe to {topics:?}: {e}")))?;
        tracing::info!(group, ?topics, "Kafka subscription opened");

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let message = match consumer.recv().await {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(error = %e, "Kafka receive failed");
                        tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                        continue;
                    }
                };

                let published = match decode(&message) {
                    Ok(published) => published,
                    Err(e) => {
                        metrics::counter!("events_discarded_total").increment(1);
                        tracing::warn!(
                            topic = message.topic(),
                            offset = message.offset(),
                            error = %e,
                            "Discarding undecodable message"
                        );
                        commit(&consumer, &message);
                        continue;
                    }
                };

                let (ack, acked) = oneshot::channel();
                if sender.send(Delivery::with_ack(published, ack)).is_err() {
                    break;
                }
                match acked.await {
                    Ok(()) => commit(&consumer, &message),
                    Err(_) if sender.is_closed() => break,
                    Err(_) => tracing::warn!(
                        topic = message.topic(),
                        offset = message.offset(),
                        "Delivery dropped without ack, offset not committed"
                    ),
                }
            }
            tracing::debug!("Kafka subscription closed");
        });

        Ok(Subscription::new(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KafkaEventBus>();
    }

    #[test]
    fn config_defaults() {
        let config = KafkaConfig::new("localhost:9092");
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.auto_offset_reset, "earliest");
    }

    #[tokio::test]
    async fn creating_the_bus_does_not_contact_brokers() {
        let bus = KafkaEventBus::new(KafkaConfig::new("127.0.0.1:1")).unwrap();
        assert_eq!(bus.config().brokers, "127.0.0.1:1");
    }
}
