//! Payment gateway integration.
//!
//! - [`PaymentGateway`] is the contract the payment service calls
//! - [`InMemoryGateway`] is a scriptable gateway for tests and local runs
//! - [`StripeGateway`] talks to a Stripe-compatible HTTP API
//! - [`WebhookVerifier`] checks `Stripe-Signature` headers and parses events

pub mod error;
pub mod gateway;
pub mod memory;
pub mod signature;
pub mod stripe;

pub use error::{GatewayError, Result};
pub use gateway::{IntentCreated, IntentStatus, PaymentGateway, RefundCreated};
pub use memory::InMemoryGateway;
pub use signature::{
    DEFAULT_TOLERANCE, WebhookEvent, WebhookEventData, WebhookVerifier, sign_payload,
    verify_signature,
};
pub use stripe::{IDEMPOTENCY_KEY_HEADER, StripeConfig, StripeGateway};
