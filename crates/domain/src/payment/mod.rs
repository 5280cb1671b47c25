//! Payment records, state machine, service and webhook handling.

mod commands;
mod events;
mod model;
mod service;
mod state;
mod webhook;

pub use commands::{
    CreateIntent, CreatedIntent, DEFAULT_PAYMENT_CURRENCY, PaymentFilter, RefundPayment,
};
pub use events::{PaymentEvent, PaymentEventData};
pub use model::{DEFAULT_REFUND_REASON, Payment, REFUND_CLAIM_TIMEOUT, Refund};
pub use service::PaymentService;
pub use state::PaymentStatus;
pub use webhook::{GatewayEventKind, WEBHOOK_SOURCE, WebhookOutcome};
