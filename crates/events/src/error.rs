use thiserror::Error;

/// Errors that can occur when publishing to an event bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus could not accept the message.
    #[error("Event bus unavailable: {0}")]
    Unavailable(String),

    /// A consumed message is not a valid event.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The event payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
