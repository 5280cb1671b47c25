//! Shared types used across the ledger, gateway and domain crates.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{OrderId, PaymentId, RefundId, UserId};
