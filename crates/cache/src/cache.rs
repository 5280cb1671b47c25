use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::Result;

/// A TTL-bounded string cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the cached value, or `None` on a miss or expired entry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value that expires after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes every key matching a glob pattern (`*` matches any run of
    /// characters). Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: Cache + ?Sized> Cache for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        (**self).delete_pattern(pattern).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}

/// JSON helpers on top of [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Reads and deserializes a cached value.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serializes and stores a value.
    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw, ttl).await
    }
}

impl<T: Cache + ?Sized> CacheExt for T {}

/// Matches a key against a glob pattern where `*` matches any run of
/// characters and every other character matches itself.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // No '*' at all: exact match.
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_exact_match() {
        assert!(glob_match("order:1", "order:1"));
        assert!(!glob_match("order:1", "order:12"));
    }

    #[test]
    fn glob_prefix_and_suffix() {
        assert!(glob_match("order:*", "order:abc"));
        assert!(glob_match("order:*", "order:"));
        assert!(!glob_match("order:*", "payment:abc"));
        assert!(glob_match("*:refunds", "payment:pi_1:refunds"));
        assert!(!glob_match("*:refunds", "payment:pi_1"));
    }

    #[test]
    fn glob_middle_wildcards() {
        assert!(glob_match("payment:*:refunds", "payment:pi_1:refunds"));
        assert!(!glob_match("payment:*:refunds", "order:pi_1:refunds"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxcyyb"));
    }
}
