//! Domain error types.

use gateway::GatewayError;
use ledger::{LedgerError, Table};
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request is malformed or violates a business rule.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested status change is not in the transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The operation is not allowed in the record's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A concurrent writer kept winning the race.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A webhook delivery could not be authenticated.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The payment gateway failed or timed out.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// A storage or serialization failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        DomainError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Returns the entity name used in error messages for a table.
pub(crate) fn entity_name(table: Table) -> &'static str {
    match table {
        Table::Orders => "Order",
        Table::Payments => "Payment",
        Table::Refunds => "Refund",
    }
}

impl From<LedgerError> for DomainError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound { table, id } => DomainError::NotFound {
                entity: entity_name(table),
                id,
            },
            LedgerError::Conflict { .. } | LedgerError::AlreadyExists { .. } => {
                DomainError::Conflict(e.to_string())
            }
            other => DomainError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Internal(format!("Serialization error: {e}"))
    }
}

impl From<GatewayError> for DomainError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(_) | GatewayError::InvalidRequest(_) => {
                DomainError::GatewayUnavailable(e.to_string())
            }
            GatewayError::MissingWebhookSecret | GatewayError::InvalidSignature(_) => {
                DomainError::Authentication(e.to_string())
            }
            GatewayError::InvalidPayload(_) => DomainError::Validation(e.to_string()),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
