use thiserror::Error;

/// Errors that can occur when talking to a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A Redis error occurred.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A cached value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
