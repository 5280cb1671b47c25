use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    LedgerError, Result, Row, RowPatch, RowQuery, SortOrder, Table,
    store::{LedgerStore, QueryResult, UpdateOptions},
};

/// In-memory ledger store implementation for testing and local runs.
///
/// Provides the same interface and conflict semantics as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    rows: Arc<RwLock<HashMap<(Table, String), Row>>>,
    processed: Arc<RwLock<HashSet<(String, String)>>>,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows stored in a table.
    pub async fn row_count(&self, table: Table) -> usize {
        self.rows
            .read()
            .await
            .keys()
            .filter(|(t, _)| *t == table)
            .count()
    }

    /// Clears all rows and processed-event markers.
    pub async fn clear(&self) {
        self.rows.write().await.clear();
        self.processed.write().await.clear();
    }
}

fn matches_query(row: &Row, query: &RowQuery) -> bool {
    if row.table != query.table {
        return false;
    }
    if let Some(ref owner) = query.owner_id
        && row.owner_id.as_ref() != Some(owner)
    {
        return false;
    }
    if let Some(ref parent) = query.parent_id
        && row.parent_id.as_ref() != Some(parent)
    {
        return false;
    }
    if let Some(ref status) = query.status
        && &row.status != status
    {
        return false;
    }
    if let Some(ref external_ref) = query.external_ref
        && row.external_ref.as_ref() != Some(external_ref)
    {
        return false;
    }
    if let Some(before) = query.created_before
        && row.created_at >= before
    {
        return false;
    }
    true
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get(&self, table: Table, id: &str) -> Result<Row> {
        self.rows
            .read()
            .await
            .get(&(table, id.to_string()))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound {
                table,
                id: id.to_string(),
            })
    }

    async fn create(&self, row: Row) -> Result<Row> {
        let mut rows = self.rows.write().await;
        let key = (row.table, row.id.clone());
        if rows.contains_key(&key) {
            return Err(LedgerError::AlreadyExists {
                table: row.table,
                id: row.id,
            });
        }
        rows.insert(key, row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: RowPatch,
        options: UpdateOptions,
    ) -> Result<Row> {
        // The write lock is held across check and write.
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&(table, id.to_string()))
            .ok_or_else(|| LedgerError::NotFound {
                table,
                id: id.to_string(),
            })?;

        if !options.matches(row) {
            return Err(LedgerError::Conflict {
                table,
                id: id.to_string(),
                actual_version: row.version,
                actual_status: row.status.clone(),
            });
        }

        row.status = patch.status;
        row.data = patch.data;
        row.version = row.version.next();
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn query(&self, query: RowQuery) -> Result<QueryResult> {
        let rows = self.rows.read().await;
        let mut matched: Vec<_> = rows
            .values()
            .filter(|r| matches_query(r, &query))
            .cloned()
            .collect();

        // Sort by creation time, id as tie-breaker
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if query.order == SortOrder::NewestFirst {
            matched.reverse();
        }

        let total = matched.len() as u64;
        let offset = query.offset.unwrap_or(0);
        let page: Vec<_> = matched
            .into_iter()
            .skip(offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(QueryResult { rows: page, total })
    }

    async fn mark_processed(&self, source: &str, event_id: &str) -> Result<bool> {
        Ok(self
            .processed
            .write()
            .await
            .insert((source.to_string(), event_id.to_string())))
    }

    async fn is_processed(&self, source: &str, event_id: &str) -> Result<bool> {
        Ok(self
            .processed
            .read()
            .await
            .contains(&(source.to_string(), event_id.to_string())))
    }
}
