//! Ledger store: the single source of truth for order, payment and refund rows.
//!
//! Rows are keyed by `(table, id)` and carry a version counter used for
//! conditional writes. Two backends are provided: an in-memory store for tests
//! and local runs, and a PostgreSQL store.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod row;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::{RowQuery, SortOrder};
pub use row::{Row, RowBuilder, RowPatch, Table, Version};
pub use store::{LedgerStore, LedgerStoreExt, QueryResult, UpdateOptions};
