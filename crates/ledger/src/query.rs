use chrono::{DateTime, Utc};

use crate::Table;

/// Ordering of query results by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Builder for constructing row queries.
///
/// Every query targets one table; the remaining filters are optional and
/// combined with AND.
#[derive(Debug, Clone)]
pub struct RowQuery {
    pub table: Table,

    /// Filter by owning user.
    pub owner_id: Option<String>,

    /// Filter by parent record.
    pub parent_id: Option<String>,

    /// Filter by status.
    pub status: Option<String>,

    /// Filter by external reference.
    pub external_ref: Option<String>,

    /// Filter by rows created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,

    /// Maximum number of rows to return.
    pub limit: Option<usize>,

    /// Number of rows to skip.
    pub offset: Option<usize>,

    pub order: SortOrder,
}

impl RowQuery {
    /// Creates a query returning every row of a table, newest first.
    pub fn new(table: Table) -> Self {
        Self {
            table,
            owner_id: None,
            parent_id: None,
            status: None,
            external_ref: None,
            created_before: None,
            limit: None,
            offset: None,
            order: SortOrder::default(),
        }
    }

    pub fn owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    pub fn created_before(mut self, instant: DateTime<Utc>) -> Self {
        self.created_before = Some(instant);
        self
    }

    /// Limits the number of rows returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many rows before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}
