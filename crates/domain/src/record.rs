//! Core record and domain event traits.

use chrono::{DateTime, Utc};
use events::Exchange;
use ledger::Table;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and named in past tense.
pub trait DomainEvent: Serialize + Send + Sync {
    /// Returns the event type, used as the routing key.
    fn event_type(&self) -> &'static str;

    /// Returns the exchange the event is published to.
    fn exchange(&self) -> Exchange;
}

/// Trait for records kept as ledger rows.
///
/// The whole record is stored as the row's data; the accessors below supply
/// the indexed columns. The row version is not part of the record.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The table the record lives in.
    const TABLE: Table;

    /// Returns the record's identifier as stored in the row.
    fn id(&self) -> String;

    /// Returns the status column value.
    fn status(&self) -> &str;

    /// Returns the owning user, if any.
    fn owner_id(&self) -> Option<&str> {
        None
    }

    /// Returns the parent record, if any.
    fn parent_id(&self) -> Option<&str> {
        None
    }

    /// Returns the identifier an external system knows the record by.
    fn external_ref(&self) -> Option<&str> {
        None
    }

    fn created_at(&self) -> DateTime<Utc>;

    /// Returns the cache key for a record id, e.g. `order:<id>`.
    fn cache_key(id: &str) -> String;
}
