use thiserror::Error;

use crate::{Table, Version};

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No row exists with the given key.
    #[error("Row not found: {table}/{id}")]
    NotFound { table: Table, id: String },

    /// A row with the given key already exists.
    #[error("Row already exists: {table}/{id}")]
    AlreadyExists { table: Table, id: String },

    /// A conditional update lost a race: the row no longer matches the
    /// expected version or status.
    #[error(
        "Concurrent write conflict on {table}/{id}: row is at version {actual_version} with status {actual_status}"
    )]
    Conflict {
        table: Table,
        id: String,
        actual_version: Version,
        actual_status: String,
    },

    /// The row is missing a required field or is otherwise malformed.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
