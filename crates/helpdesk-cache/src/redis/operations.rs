//! [`CacheProvider`] over Redis. Expiry is always set in milliseconds
//! together with the value so a key never exists without a TTL.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use helpdesk_core::error::{AppError, ErrorKind};
use helpdesk_core::result::AppResult;
use helpdesk_core::traits::cache::CacheProvider;

use super::client::RedisClient;

/// Lua script for atomic compare-and-delete.
///
/// KEYS[1] = key
/// ARGV[1] = expected value
///
/// Returns 1 if the key held the expected value and was deleted, else 0.
const DELETE_IF_EQ_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// Lua script for atomic compare-and-expire.
///
/// KEYS[1] = key
/// ARGV[1] = expected value
/// ARGV[2] = new TTL in milliseconds
///
/// Returns 1 if the key held the expected value and its TTL was reset, else 0.
const EXPIRE_IF_EQ_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('PEXPIRE', KEYS[1], ARGV[2])
    end
    return 0
"#;

/// Lock store shared by every instance of the service.
#[derive(Debug, Clone)]
pub struct RedisCacheProvider {
    client: RedisClient,
}

impl RedisCacheProvider {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn target(&self, key: &str) -> (String, ConnectionManager) {
        (self.client.key(key), self.client.connection())
    }

    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Cache, format!("Redis error: {e}"), e)
    }
}

/// `SET key value PX ttl`, the base of both `set` and `set_nx`.
fn set_with_expiry(key: &str, value: &str, ttl: Duration) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value).arg("PX").arg(ttl_millis(ttl));
    cmd
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let (full_key, mut conn) = self.target(key);
        let result: Option<String> = conn.get(&full_key).await.map_err(Self::map_err)?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let (full_key, mut conn) = self.target(key);
        let _: () = set_with_expiry(&full_key, value, ttl)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let (full_key, mut conn) = self.target(key);
        // Nil reply when the key already exists.
        let result: Option<String> = set_with_expiry(&full_key, value, ttl)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let (full_key, mut conn) = self.target(key);
        let _: () = conn.del(&full_key).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> AppResult<bool> {
        let (full_key, mut conn) = self.target(key);
        let removed: i64 = redis::Script::new(DELETE_IF_EQ_SCRIPT)
            .key(&full_key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        Ok(removed == 1)
    }

    async fn expire_if_eq(&self, key: &str, expected: &str, ttl: Duration) -> AppResult<bool> {
        let (full_key, mut conn) = self.target(key);
        let refreshed: i64 = redis::Script::new(EXPIRE_IF_EQ_SCRIPT)
            .key(&full_key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        Ok(refreshed == 1)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let (full_key, mut conn) = self.target(key);
        let result: bool = conn.exists(&full_key).await.map_err(Self::map_err)?;
        Ok(result)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.connection();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(1800)), 1_800_000);
    }
}
