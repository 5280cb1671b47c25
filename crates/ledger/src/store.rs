use std::sync::Arc;

use async_trait::async_trait;

use crate::{LedgerError, Result, Row, RowPatch, RowQuery, Table, Version};

/// Preconditions for a conditional update.
///
/// When a field is set the update is applied only if the stored row still
/// matches it; otherwise the store fails with `Conflict`.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub expected_version: Option<Version>,
    pub expected_status: Option<String>,
}

impl UpdateOptions {
    /// Creates options with no precondition (use with caution).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the row to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
            expected_status: None,
        }
    }

    /// Creates options expecting the row to be in a specific status.
    pub fn expect_status(status: impl Into<String>) -> Self {
        Self {
            expected_version: None,
            expected_status: Some(status.into()),
        }
    }

    /// Adds a status precondition.
    pub fn and_status(mut self, status: impl Into<String>) -> Self {
        self.expected_status = Some(status.into());
        self
    }

    /// Returns true if the row satisfies every precondition.
    pub fn matches(&self, row: &Row) -> bool {
        self.expected_version.is_none_or(|v| v == row.version)
            && self
                .expected_status
                .as_deref()
                .is_none_or(|s| s == row.status)
    }
}

/// One page of query results plus the number of rows matching the filters.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub total: u64,
}

/// Core trait for ledger store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetches a row by key. Fails with `NotFound` if it does not exist.
    async fn get(&self, table: Table, id: &str) -> Result<Row>;

    /// Inserts a new row. Fails with `AlreadyExists` if the key is taken.
    async fn create(&self, row: Row) -> Result<Row>;

    /// Replaces a row's status and data, bumping its version.
    ///
    /// The check against `options` and the write happen atomically; if the
    /// stored row no longer matches, the update fails with `Conflict` and
    /// nothing is written.
    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: RowPatch,
        options: UpdateOptions,
    ) -> Result<Row>;

    /// Returns the rows matching a query along with the unpaginated total.
    async fn query(&self, query: RowQuery) -> Result<QueryResult>;

    /// Records that an external event has been handled.
    ///
    /// Returns false if the event was already recorded.
    async fn mark_processed(&self, source: &str, event_id: &str) -> Result<bool>;

    /// Returns true if an external event has already been handled.
    async fn is_processed(&self, source: &str, event_id: &str) -> Result<bool>;
}

#[async_trait]
impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    async fn get(&self, table: Table, id: &str) -> Result<Row> {
        (**self).get(table, id).await
    }

    async fn create(&self, row: Row) -> Result<Row> {
        (**self).create(row).await
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: RowPatch,
        options: UpdateOptions,
    ) -> Result<Row> {
        (**self).update(table, id, patch, options).await
    }

    async fn query(&self, query: RowQuery) -> Result<QueryResult> {
        (**self).query(query).await
    }

    async fn mark_processed(&self, source: &str, event_id: &str) -> Result<bool> {
        (**self).mark_processed(source, event_id).await
    }

    async fn is_processed(&self, source: &str, event_id: &str) -> Result<bool> {
        (**self).is_processed(source, event_id).await
    }
}

/// Extension trait providing convenience methods for ledger stores.
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Fetches a row, mapping `NotFound` to `None`.
    async fn find(&self, table: Table, id: &str) -> Result<Option<Row>> {
        match self.get(table, id).await {
            Ok(row) => Ok(Some(row)),
            Err(LedgerError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Finds the newest row carrying an external reference.
    async fn find_by_external_ref(&self, table: Table, external_ref: &str) -> Result<Option<Row>> {
        let result = self
            .query(RowQuery::new(table).external_ref(external_ref).limit(1))
            .await?;
        Ok(result.rows.into_iter().next())
    }

    /// Checks if a row exists.
    async fn exists(&self, table: Table, id: &str) -> Result<bool> {
        Ok(self.find(table, id).await?.is_some())
    }
}

// Blanket implementation for all LedgerStore implementations
impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}
