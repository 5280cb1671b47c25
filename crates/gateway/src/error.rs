use thiserror::Error;

/// Errors returned by the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached, timed out or failed on its side.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway rejected the request.
    #[error("Payment gateway rejected the request: {0}")]
    InvalidRequest(String),

    /// No webhook secret is configured.
    #[error("Webhook secret is not configured")]
    MissingWebhookSecret,

    /// The webhook signature header is missing, malformed, stale or wrong.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// The webhook body is not a valid event.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
