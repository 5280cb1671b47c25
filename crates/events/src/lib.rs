//! Domain event publication.
//!
//! - [`EventEnvelope`] is the wire shape every subscriber sees
//! - [`EventBus`] is the topic-addressed transport
//! - [`InMemoryEventBus`] fans messages out to in-process subscribers
//! - `KafkaEventBus` (feature `kafka`) runs over a Kafka-compatible broker
//! - [`EventPublisher`] is the fire-and-forget front the services call

pub mod bus;
pub mod envelope;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod publisher;

pub use bus::{Delivery, EventBus, PublishOptions, Subscription};
pub use envelope::{EventEnvelope, Exchange};
pub use error::{BusError, Result};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaEventBus};
pub use memory::{InMemoryEventBus, PublishedMessage};
pub use publisher::EventPublisher;
