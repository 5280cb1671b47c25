//! Key/value cache used as a read-through layer in front of the ledger.
//!
//! Values are JSON strings stored with a time-to-live. The cache is never a
//! source of truth: callers fall back to the ledger on a miss and treat cache
//! failures as misses.

pub mod cache;
pub mod error;
pub mod memory;
pub mod redis_cache;

pub use cache::{Cache, CacheExt, glob_match};
pub use error::{CacheError, Result};
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;
