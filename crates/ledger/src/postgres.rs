use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    PgPool, Postgres, Row as SqlxRow,
    postgres::{PgArguments, PgRow},
    query::Query,
};

use crate::{
    LedgerError, Result, Row, RowPatch, RowQuery, SortOrder, Table, Version,
    store::{LedgerStore, QueryResult, UpdateOptions},
};

const ROW_COLUMNS: &str = "table_name, id, version, status, owner_id, parent_id, external_ref, created_at, updated_at, data";

/// PostgreSQL-backed ledger store implementation.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn pg_row_to_row(row: PgRow) -> Result<Row> {
        let table_name: String = row.try_get("table_name")?;
        let table = Table::parse(&table_name)
            .ok_or_else(|| LedgerError::InvalidRow(format!("unknown table '{table_name}'")))?;

        Ok(Row {
            table,
            id: row.try_get("id")?,
            version: Version::new(row.try_get("version")?),
            status: row.try_get("status")?,
            owner_id: row.try_get("owner_id")?,
            parent_id: row.try_get("parent_id")?,
            external_ref: row.try_get("external_ref")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            data: row.try_get("data")?,
        })
    }

    /// Appends the WHERE clause for a query's filters, starting at `$1`.
    fn where_clause(query: &RowQuery) -> (String, usize) {
        let mut sql = String::from(" WHERE table_name = $1");
        let mut param_count = 1;

        if query.owner_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND owner_id = ${param_count}"));
        }
        if query.parent_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND parent_id = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if query.external_ref.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND external_ref = ${param_count}"));
        }
        if query.created_before.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at < ${param_count}"));
        }

        (sql, param_count)
    }

    /// Binds a query's filters in the order `where_clause` numbered them.
    fn bind_filters<'q>(
        mut sqlx_query: Query<'q, Postgres, PgArguments>,
        query: &RowQuery,
    ) -> Query<'q, Postgres, PgArguments> {
        sqlx_query = sqlx_query.bind(query.table.as_str());
        if let Some(ref owner_id) = query.owner_id {
            sqlx_query = sqlx_query.bind(owner_id.clone());
        }
        if let Some(ref parent_id) = query.parent_id {
            sqlx_query = sqlx_query.bind(parent_id.clone());
        }
        if let Some(ref status) = query.status {
            sqlx_query = sqlx_query.bind(status.clone());
        }
        if let Some(ref external_ref) = query.external_ref {
            sqlx_query = sqlx_query.bind(external_ref.clone());
        }
        if let Some(before) = query.created_before {
            sqlx_query = sqlx_query.bind(before);
        }
        sqlx_query
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn get(&self, table: Table, id: &str) -> Result<Row> {
        let row = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM ledger_rows WHERE table_name = $1 AND id = $2"
        ))
        .bind(table.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::pg_row_to_row(row),
            None => Err(LedgerError::NotFound {
                table,
                id: id.to_string(),
            }),
        }
    }

    async fn create(&self, row: Row) -> Result<Row> {
        sqlx::query(&format!(
            "INSERT INTO ledger_rows ({ROW_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(row.table.as_str())
        .bind(&row.id)
        .bind(row.version.as_i64())
        .bind(&row.status)
        .bind(&row.owner_id)
        .bind(&row.parent_id)
        .bind(&row.external_ref)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(&row.data)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return LedgerError::AlreadyExists {
                    table: row.table,
                    id: row.id.clone(),
                };
            }
            LedgerError::Database(e)
        })?;

        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: RowPatch,
        options: UpdateOptions,
    ) -> Result<Row> {
        // Preconditions live in the WHERE clause so check and write are one statement.
        let updated = sqlx::query(&format!(
            r#"
            UPDATE ledger_rows
            SET status = $3, data = $4, version = version + 1, updated_at = $5
            WHERE table_name = $1 AND id = $2
              AND ($6::BIGINT IS NULL OR version = $6)
              AND ($7::TEXT IS NULL OR status = $7)
            RETURNING {ROW_COLUMNS}
            "#
        ))
        .bind(table.as_str())
        .bind(id)
        .bind(&patch.status)
        .bind(&patch.data)
        .bind(Utc::now())
        .bind(options.expected_version.map(|v| v.as_i64()))
        .bind(options.expected_status.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Self::pg_row_to_row(row);
        }

        // Nothing matched: either the row is gone or a precondition failed.
        let current = self.get(table, id).await?;
        Err(LedgerError::Conflict {
            table,
            id: id.to_string(),
            actual_version: current.version,
            actual_status: current.status,
        })
    }

    async fn query(&self, query: RowQuery) -> Result<QueryResult> {
        let (where_sql, mut param_count) = Self::where_clause(&query);

        let count_sql = format!("SELECT COUNT(*) FROM ledger_rows{where_sql}");
        let count_row = Self::bind_filters(sqlx::query(&count_sql), &query)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = count_row.try_get(0)?;

        let mut sql = format!("SELECT {ROW_COLUMNS} FROM ledger_rows{where_sql}");
        match query.order {
            SortOrder::NewestFirst => sql.push_str(" ORDER BY created_at DESC, id DESC"),
            SortOrder::OldestFirst => sql.push_str(" ORDER BY created_at ASC, id ASC"),
        }
        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = Self::bind_filters(sqlx::query(&sql), &query);
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let rows = rows
            .into_iter()
            .map(Self::pg_row_to_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryResult {
            rows,
            total: total.max(0) as u64,
        })
    }

    async fn mark_processed(&self, source: &str, event_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (source, event_id, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (source, event_id) DO NOTHING
            "#,
        )
        .bind(source)
        .bind(event_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_processed(&self, source: &str, event_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE source = $1 AND event_id = $2)",
        )
        .bind(source)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
