use std::sync::Arc;

use serde::Serialize;

use crate::{EventBus, EventEnvelope, Exchange, PublishOptions};

/// Fire-and-forget publisher used by the lifecycle services.
///
/// Publishing never fails from the caller's point of view: serialization and
/// transport errors are logged and counted, and a publisher without a bus
/// only logs.
#[derive(Clone, Default)]
pub struct EventPublisher {
    bus: Option<Arc<dyn EventBus>>,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus: Some(bus) }
    }

    /// Creates a publisher with no bus.
    pub fn disabled() -> Self {
        Self { bus: None }
    }

    /// Returns true if a bus is attached.
    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    /// Wraps `data` in an envelope and publishes it with the event type as
    /// routing key.
    pub async fn publish<T: Serialize + Sync>(&self, exchange: Exchange, event_type: &str, data: &T) {
        match EventEnvelope::new(event_type, data) {
            Ok(envelope) => self.publish_envelope(exchange, &envelope).await,
            Err(e) => {
                metrics::counter!("events_publish_failures_total").increment(1);
                tracing::error!(event_type, error = %e, "Failed to serialize event");
            }
        }
    }

    /// Publishes a prepared envelope.
    pub async fn publish_envelope(&self, exchange: Exchange, envelope: &EventEnvelope) {
        let Some(bus) = &self.bus else {
            tracing::debug!(
                exchange = %exchange,
                event_type = %envelope.event_type,
                "No event bus configured, dropping event"
            );
            return;
        };

        match bus
            .publish(
                exchange.as_str(),
                &envelope.event_type,
                envelope,
                PublishOptions::persistent(),
            )
            .await
        {
            Ok(()) => {
                metrics::counter!("events_published_total").increment(1);
                tracing::debug!(
                    exchange = %exchange,
                    event_type = %envelope.event_type,
                    "Event published"
                );
            }
            Err(e) => {
                metrics::counter!("events_publish_failures_total").increment(1);
                tracing::warn!(
                    exchange = %exchange,
                    event_type = %envelope.event_type,
                    error = %e,
                    "Failed to publish event"
                );
            }
        }
    }
}
