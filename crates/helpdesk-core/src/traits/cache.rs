//! Key-value store trait backing distributed locks.

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// Trait for TTL key-value backends (Redis or in-memory).
///
/// Implementations must guarantee that [`set_nx`](CacheProvider::set_nx) is
/// atomic: of any number of concurrent callers for the same absent key,
/// exactly one observes `true`. Entries disappear on their own once their
/// TTL elapses.
#[async_trait]
pub trait CacheProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a value with a TTL, overwriting any existing value and resetting its clock.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Set a value only if the key does not already exist (NX).
    /// Returns `true` if the value was set, `false` if the key already existed.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Delete a key only if it currently holds `expected`.
    /// Returns `true` if the key was removed.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> AppResult<bool>;

    /// Reset the TTL of a key only if it currently holds `expected`.
    /// Returns `true` if the TTL was reset.
    async fn expire_if_eq(&self, key: &str, expected: &str, ttl: Duration) -> AppResult<bool>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
