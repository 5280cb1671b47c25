//! Record persistence over the ledger store and the cache.

use std::marker::PhantomData;
use std::time::Duration;

use cache::{Cache, CacheExt};
use ledger::{LedgerError, LedgerStore, Row, RowPatch, RowQuery, UpdateOptions, Version};

use crate::error::{DomainError, Result, entity_name};
use crate::record::Record;

/// How many times a conditional write is attempted before giving up.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Default lifetime of cached records.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Lifetime of entries filled by a read after a cache miss.
///
/// Such a fill can land after a concurrent write invalidated the key and
/// hold the row that write replaced.
pub const MISS_FILL_TTL: Duration = Duration::from_secs(30);

/// Result of a conditional write.
#[derive(Debug, Clone)]
pub struct WriteResult<R> {
    /// The record as read from the store before the write.
    pub before: R,

    /// The record after the write. Equal to `before` when nothing changed.
    pub record: R,

    /// The row version after the write.
    pub version: Version,

    /// False when the mutation decided there was nothing to do.
    pub changed: bool,
}

/// Reads and writes one kind of record.
///
/// Reads go through the cache and fall back to the store; cache failures are
/// logged and treated as misses. Writes are always decided against the
/// store's current row and applied with a conditional update, after which the
/// cached copy is invalidated.
pub struct Repository<S, C, R>
where
    S: LedgerStore,
    C: Cache,
    R: Record,
{
    store: S,
    cache: C,
    cache_ttl: Duration,
    _phantom: PhantomData<R>,
}

impl<S, C, R> Repository<S, C, R>
where
    S: LedgerStore,
    C: Cache,
    R: Record,
{
    pub fn new(store: S, cache: C, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            cache_ttl,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a reference to the underlying cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Loads a record, serving it from the cache when possible.
    pub async fn get(&self, id: &str) -> Result<R> {
        let key = R::cache_key(id);
        let table = R::TABLE.as_str();

        match self.cache.get_json::<R>(&key).await {
            Ok(Some(record)) => {
                metrics::counter!("cache_hits_total", "table" => table).increment(1);
                return Ok(record);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, falling back to store");
            }
        }
        metrics::counter!("cache_misses_total", "table" => table).increment(1);

        let (record, _) = self.load(id).await?;
        self.cache_with_ttl(&record, MISS_FILL_TTL.min(self.cache_ttl))
            .await;
        Ok(record)
    }

    /// Loads a record and its row version from the store, bypassing the cache.
    pub async fn load(&self, id: &str) -> Result<(R, Version)> {
        let row = self.store.get(R::TABLE, id).await?;
        Ok((row.decode()?, row.version))
    }

    /// Inserts a new record and drops any cached copy of its key.
    pub async fn create(&self, record: &R) -> Result<Version> {
        let id = record.id();
        let mut builder = Row::builder(R::TABLE, id.clone())
            .status(record.status())
            .created_at(record.created_at())
            .data(record)?;
        if let Some(owner) = record.owner_id() {
            builder = builder.owner_id(owner);
        }
        if let Some(parent) = record.parent_id() {
            builder = builder.parent_id(parent);
        }
        if let Some(external) = record.external_ref() {
            builder = builder.external_ref(external);
        }

        let row = self.store.create(builder.build()?).await?;
        self.invalidate(&id).await;
        Ok(row.version)
    }

    /// Applies a mutation with a conditional write.
    ///
    /// The mutation receives the record as currently stored and returns the
    /// new record, or `None` when there is nothing to change. If another
    /// writer got there first the record is re-read and the mutation runs
    /// again, up to [`MAX_WRITE_ATTEMPTS`] times.
    pub async fn execute<F>(&self, id: &str, mut mutate: F) -> Result<WriteResult<R>>
    where
        F: FnMut(&R) -> Result<Option<R>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let row = self.store.get(R::TABLE, id).await?;
            let current: R = row.decode()?;

            let Some(next) = mutate(&current)? else {
                return Ok(WriteResult {
                    before: current.clone(),
                    record: current,
                    version: row.version,
                    changed: false,
                });
            };

            let patch = RowPatch::new(next.status(), &next)?;
            let options = UpdateOptions::expect_version(row.version).and_status(row.status.clone());

            match self.store.update(R::TABLE, id, patch, options).await {
                Ok(updated) => {
                    self.invalidate(id).await;
                    return Ok(WriteResult {
                        before: current,
                        record: next,
                        version: updated.version,
                        changed: true,
                    });
                }
                Err(LedgerError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(
                        table = %R::TABLE,
                        id,
                        attempt,
                        "Concurrent write detected, retrying"
                    );
                }
                Err(LedgerError::Conflict { .. }) => {
                    return Err(DomainError::Conflict(format!(
                        "{} {id} was modified concurrently",
                        entity_name(R::TABLE)
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Runs a store query and decodes the rows.
    pub async fn query(&self, query: RowQuery) -> Result<(Vec<R>, u64)> {
        let result = self.store.query(query).await?;
        let records = result
            .rows
            .iter()
            .map(Row::decode)
            .collect::<std::result::Result<Vec<R>, LedgerError>>()?;
        Ok((records, result.total))
    }

    /// Stores a record the caller just wrote in the cache.
    pub async fn cache_put(&self, record: &R) {
        self.cache_with_ttl(record, self.cache_ttl).await;
    }

    async fn cache_with_ttl(&self, record: &R, ttl: Duration) {
        let key = R::cache_key(&record.id());
        if let Err(e) = self.cache.set_json(&key, record, ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    /// Drops the cached copy of a record.
    pub async fn invalidate(&self, id: &str) {
        let key = R::cache_key(id);
        if let Err(e) = self.cache.delete(&key).await {
            tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cache::InMemoryCache;
    use chrono::{DateTime, Utc};
    use ledger::{InMemoryLedgerStore, QueryResult, Table};
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        status: String,
        text: String,
        created_at: DateTime<Utc>,
    }

    impl Record for Note {
        const TABLE: Table = Table::Orders;

        fn id(&self) -> String {
            self.id.clone()
        }

        fn status(&self) -> &str {
            &self.status
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn cache_key(id: &str) -> String {
            format!("note:{id}")
        }
    }

    fn note(id: &str, text: &str) -> Note {
        Note {
            id: id.to_string(),
            status: "open".to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        }
    }

    fn repo(
        store: InMemoryLedgerStore,
        cache: InMemoryCache,
    ) -> Repository<InMemoryLedgerStore, InMemoryCache, Note> {
        Repository::new(store, cache, DEFAULT_CACHE_TTL)
    }

    /// Store whose updates always lose the race.
    #[derive(Clone, Default)]
    struct AlwaysConflicting {
        inner: InMemoryLedgerStore,
        updates: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LedgerStore for AlwaysConflicting {
        async fn get(&self, table: Table, id: &str) -> ledger::Result<Row> {
            self.inner.get(table, id).await
        }

        async fn create(&self, row: Row) -> ledger::Result<Row> {
            self.inner.create(row).await
        }

        async fn update(
            &self,
            table: Table,
            id: &str,
            _patch: RowPatch,
            _options: UpdateOptions,
        ) -> ledger::Result<Row> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::Conflict {
                table,
                id: id.to_string(),
                actual_version: Version::new(99),
                actual_status: "open".to_string(),
            })
        }

        async fn query(&self, query: RowQuery) -> ledger::Result<QueryResult> {
            self.inner.query(query).await
        }

        async fn mark_processed(&self, source: &str, event_id: &str) -> ledger::Result<bool> {
            self.inner.mark_processed(source, event_id).await
        }

        async fn is_processed(&self, source: &str, event_id: &str) -> ledger::Result<bool> {
            self.inner.is_processed(source, event_id).await
        }
    }

    #[tokio::test]
    async fn get_fills_cache_on_miss() {
        let cache = InMemoryCache::new();
        let repo = repo(InMemoryLedgerStore::new(), cache.clone());
        repo.create(&note("n-1", "hello")).await.unwrap();

        assert!(cache.get("note:n-1").await.unwrap().is_none());
        let loaded = repo.get("n-1").await.unwrap();
        assert_eq!(loaded.text, "hello");
        assert!(cache.get("note:n-1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn miss_fill_expires_before_written_entries() {
        let cache = InMemoryCache::new();
        let repo = repo(InMemoryLedgerStore::new(), cache.clone());
        repo.create(&note("n-1", "read")).await.unwrap();
        repo.get("n-1").await.unwrap();

        let written = note("n-2", "written");
        repo.create(&written).await.unwrap();
        repo.cache_put(&written).await;

        tokio::time::advance(MISS_FILL_TTL + Duration::from_secs(1)).await;
        assert!(cache.get("note:n-1").await.unwrap().is_none());
        assert!(cache.get("note:n-2").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_miss_fill_is_served_for_a_bounded_time() {
        let cache = InMemoryCache::new();
        let repo = repo(InMemoryLedgerStore::new(), cache.clone());
        let original = note("n-1", "v1");
        repo.create(&original).await.unwrap();

        // A write lands between a reader's store load and its cache fill.
        repo.execute("n-1", |current| {
            let mut next = current.clone();
            next.text = "v2".to_string();
            Ok(Some(next))
        })
        .await
        .unwrap();
        repo.cache_with_ttl(&original, MISS_FILL_TTL).await;
        assert_eq!(repo.get("n-1").await.unwrap().text, "v1");

        tokio::time::advance(MISS_FILL_TTL).await;
        assert_eq!(repo.get("n-1").await.unwrap().text, "v2");
    }

    #[tokio::test]
    async fn get_falls_back_to_store_when_cache_is_down() {
        let cache = InMemoryCache::new();
        cache.set_unavailable(true);
        let repo = repo(InMemoryLedgerStore::new(), cache);
        repo.create(&note("n-1", "hello")).await.unwrap();

        let loaded = repo.get("n-1").await.unwrap();
        assert_eq!(loaded.text, "hello");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let repo = repo(InMemoryLedgerStore::new(), InMemoryCache::new());
        let result = repo.get("missing").await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn execute_writes_and_invalidates() {
        let cache = InMemoryCache::new();
        let repo = repo(InMemoryLedgerStore::new(), cache.clone());
        repo.create(&note("n-1", "v1")).await.unwrap();
        repo.get("n-1").await.unwrap();

        let result = repo
            .execute("n-1", |current| {
                let mut next = current.clone();
                next.text = "v2".to_string();
                Ok(Some(next))
            })
            .await
            .unwrap();

        assert!(result.changed);
        assert_eq!(result.before.text, "v1");
        assert_eq!(result.record.text, "v2");
        assert_eq!(result.version, Version::new(2));
        assert!(cache.get("note:n-1").await.unwrap().is_none());
        assert_eq!(repo.get("n-1").await.unwrap().text, "v2");
    }

    #[tokio::test]
    async fn execute_no_op_does_not_write() {
        let repo = repo(InMemoryLedgerStore::new(), InMemoryCache::new());
        repo.create(&note("n-1", "v1")).await.unwrap();

        let result = repo.execute("n-1", |_| Ok(None)).await.unwrap();

        assert!(!result.changed);
        assert_eq!(result.version, Version::first());
    }

    #[tokio::test]
    async fn execute_propagates_mutation_errors() {
        let repo = repo(InMemoryLedgerStore::new(), InMemoryCache::new());
        repo.create(&note("n-1", "v1")).await.unwrap();

        let result = repo
            .execute("n-1", |_| Err(DomainError::validation("nope")))
            .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        let (stored, version) = repo.load("n-1").await.unwrap();
        assert_eq!(stored.text, "v1");
        assert_eq!(version, Version::first());
    }

    #[tokio::test]
    async fn execute_gives_up_after_repeated_conflicts() {
        let store = AlwaysConflicting::default();
        let repo: Repository<_, _, Note> =
            Repository::new(store.clone(), InMemoryCache::new(), DEFAULT_CACHE_TTL);
        repo.create(&note("n-1", "v1")).await.unwrap();

        let mut calls = 0;
        let result = repo
            .execute("n-1", |current| {
                calls += 1;
                Ok(Some(current.clone()))
            })
            .await;

        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(calls, MAX_WRITE_ATTEMPTS);
        assert_eq!(store.updates.load(Ordering::SeqCst), MAX_WRITE_ATTEMPTS);
    }

    #[tokio::test]
    async fn query_decodes_rows() {
        let repo = repo(InMemoryLedgerStore::new(), InMemoryCache::new());
        repo.create(&note("n-1", "a")).await.unwrap();
        repo.create(&note("n-2", "b")).await.unwrap();

        let (notes, total) = repo.query(RowQuery::new(Table::Orders)).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(notes.len(), 2);
    }
}
