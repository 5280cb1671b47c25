use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// The logical table a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Orders,
    Payments,
    Refunds,
}

impl Table {
    /// Returns the table name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Orders => "orders",
            Table::Payments => "payments",
            Table::Refunds => "refunds",
        }
    }

    /// Parses a stored table name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "orders" => Some(Table::Orders),
            "payments" => Some(Table::Payments),
            "refunds" => Some(Table::Refunds),
            _ => None,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Version number of a row, used for conditional writes.
///
/// A freshly created row is at version 1 and every successful update
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a newly created row.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored record together with the columns the store indexes.
///
/// The full record lives in `data`; `status`, `owner_id`, `parent_id` and
/// `external_ref` are copies of the record's fields kept for lookups and
/// conditional writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub table: Table,
    pub id: String,
    pub version: Version,
    pub status: String,
    /// Owning user.
    pub owner_id: Option<String>,
    /// Parent record (the payment of a refund, the order of a payment).
    pub parent_id: Option<String>,
    /// Identifier assigned by an external system.
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl Row {
    /// Creates a new row builder.
    pub fn builder(table: Table, id: impl Into<String>) -> RowBuilder {
        RowBuilder {
            table,
            id: id.into(),
            status: None,
            owner_id: None,
            parent_id: None,
            external_ref: None,
            created_at: None,
            data: None,
        }
    }

    /// Deserializes the row's data into a record.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Builder for rows about to be created.
#[derive(Debug)]
pub struct RowBuilder {
    table: Table,
    id: String,
    status: Option<String>,
    owner_id: Option<String>,
    parent_id: Option<String>,
    external_ref: Option<String>,
    created_at: Option<DateTime<Utc>>,
    data: Option<serde_json::Value>,
}

impl RowBuilder {
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    /// Sets the creation time. If not set, the current time is used.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Sets the data from a serializable record.
    pub fn data<T: Serialize>(mut self, data: &T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Sets the data from a raw JSON value.
    pub fn data_raw(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Builds the row at [`Version::first`].
    ///
    /// Fails if the id, status or data is missing.
    pub fn build(self) -> Result<Row> {
        if self.id.trim().is_empty() {
            return Err(LedgerError::InvalidRow("id is required".to_string()));
        }
        let status = self
            .status
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LedgerError::InvalidRow("status is required".to_string()))?;
        let data = self
            .data
            .ok_or_else(|| LedgerError::InvalidRow("data is required".to_string()))?;
        let created_at = self.created_at.unwrap_or_else(Utc::now);

        Ok(Row {
            table: self.table,
            id: self.id,
            version: Version::first(),
            status,
            owner_id: self.owner_id,
            parent_id: self.parent_id,
            external_ref: self.external_ref,
            created_at,
            updated_at: created_at,
            data,
        })
    }
}

/// New values for an existing row.
#[derive(Debug, Clone)]
pub struct RowPatch {
    pub status: String,
    pub data: serde_json::Value,
}

impl RowPatch {
    /// Creates a patch from a status and a serializable record.
    pub fn new<T: Serialize>(status: impl Into<String>, data: &T) -> Result<Self> {
        Ok(Self {
            status: status.into(),
            data: serde_json::to_value(data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
        assert_eq!(Version::first().as_i64(), 1);
    }

    #[test]
    fn table_names_round_trip() {
        for table in [Table::Orders, Table::Payments, Table::Refunds] {
            assert_eq!(Table::parse(table.as_str()), Some(table));
        }
        assert_eq!(Table::parse("events"), None);
    }

    #[test]
    fn row_builder_sets_index_columns() {
        let row = Row::builder(Table::Payments, "pi_1")
            .status("pending")
            .owner_id("user-1")
            .parent_id("order-1")
            .external_ref("pi_1")
            .data_raw(serde_json::json!({"amount": 10.0}))
            .build()
            .unwrap();

        assert_eq!(row.table, Table::Payments);
        assert_eq!(row.version, Version::first());
        assert_eq!(row.status, "pending");
        assert_eq!(row.owner_id.as_deref(), Some("user-1"));
        assert_eq!(row.parent_id.as_deref(), Some("order-1"));
        assert_eq!(row.created_at, row.updated_at);
    }

    #[test]
    fn row_builder_rejects_missing_fields() {
        let missing_status = Row::builder(Table::Orders, "o-1")
            .data_raw(serde_json::json!({}))
            .build();
        assert!(matches!(missing_status, Err(LedgerError::InvalidRow(_))));

        let missing_id = Row::builder(Table::Orders, " ")
            .status("pending")
            .data_raw(serde_json::json!({}))
            .build();
        assert!(matches!(missing_id, Err(LedgerError::InvalidRow(_))));

        let missing_data = Row::builder(Table::Orders, "o-1").status("pending").build();
        assert!(matches!(missing_data, Err(LedgerError::InvalidRow(_))));
    }
}
