use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exchanges events are published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Orders,
    Payments,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Orders => "orders",
            Exchange::Payments => "payments",
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The message body published for every domain event.
///
/// Serializes as `{"eventType": ..., "timestamp": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Dotted event name, e.g. `order.created`. Also used as the routing key.
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Wraps a serializable payload, stamped with the current time.
    pub fn new<T: Serialize>(
        event_type: impl Into<String>,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Deserializes the payload.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}
