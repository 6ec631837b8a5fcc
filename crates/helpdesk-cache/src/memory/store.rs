//! In-memory key-value store with per-entry TTL.
//!
//! Expiry is measured with [`tokio::time::Instant`], so tests running on a
//! paused runtime can fast-forward past a TTL with `tokio::time::advance`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use helpdesk_core::config::cache::MemoryCacheConfig;
use helpdesk_core::error::AppError;
use helpdesk_core::result::AppResult;
use helpdesk_core::traits::cache::CacheProvider;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory TTL store. Clones share the same underlying map.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider {
    entries: Arc<DashMap<String, StoredValue>>,
    max_capacity: u64,
}

impl MemoryCacheProvider {
    /// Create a new in-memory store from configuration.
    pub fn new(config: &MemoryCacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_capacity: config.max_capacity,
        }
    }

    /// Drop every entry whose TTL has elapsed. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Purged expired in-memory entries");
        }
        removed
    }

    fn ensure_capacity(&self) -> AppResult<()> {
        if self.entries.len() as u64 >= self.max_capacity {
            self.purge_expired();
            if self.entries.len() as u64 >= self.max_capacity {
                return Err(AppError::cache(format!(
                    "In-memory store is full ({} entries)",
                    self.max_capacity
                )));
            }
        }
        Ok(())
    }
}

impl Default for MemoryCacheProvider {
    fn default() -> Self {
        Self::new(&MemoryCacheConfig::default())
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(stored) if stored.is_live(now) => return Ok(Some(stored.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // Expired: the read guard is released, reap the entry lazily.
        self.entries.remove_if(key, |_, stored| !stored.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        if !self.entries.contains_key(key) {
            self.ensure_capacity()?;
        }
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        if !self.entries.contains_key(key) {
            self.ensure_capacity()?;
        }
        let now = Instant::now();
        // The entry guard holds the shard lock, so check-and-insert is atomic.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(StoredValue::new(value, ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> AppResult<bool> {
        let now = Instant::now();
        let removed = self
            .entries
            .remove_if(key, |_, stored| stored.is_live(now) && stored.value == expected);
        Ok(removed.is_some())
    }

    async fn expire_if_eq(&self, key: &str, expected: &str, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        // The write guard holds the shard lock across the check and the update.
        match self.entries.get_mut(key) {
            Some(mut stored) if stored.is_live(now) && stored.value == expected => {
                stored.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_provider() -> MemoryCacheProvider {
        MemoryCacheProvider::new(&MemoryCacheConfig { max_capacity: 1000 })
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let provider = make_provider();
        provider
            .set("key1", "value1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(provider.get("key1").await.unwrap(), Some("value1".to_string()));

        provider.delete("key1").await.unwrap();
        assert_eq!(provider.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx() {
        let provider = make_provider();
        let first = provider
            .set_nx("nx_key", "a", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(first);
        let second = provider
            .set_nx("nx_key", "b", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!second);
        assert_eq!(provider.get("nx_key").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_set_nx_concurrent_single_winner() {
        let provider = make_provider();
        let mut handles = Vec::new();
        for i in 0..16 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                provider
                    .set_nx("contested", &format!("owner-{i}"), Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let provider = make_provider();
        provider
            .set_nx("ttl_key", "a", Duration::from_secs(30))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(provider.exists("ttl_key").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!provider.exists("ttl_key").await.unwrap());
        assert!(
            provider
                .set_nx("ttl_key", "b", Duration::from_secs(30))
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_resets_ttl() {
        let provider = make_provider();
        provider
            .set("refresh", "a", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        provider
            .set("refresh", "a", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(provider.get("refresh").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_delete_if_eq_only_matching_value() {
        let provider = make_provider();
        provider
            .set("owned", "me", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!provider.delete_if_eq("owned", "someone-else").await.unwrap());
        assert!(provider.exists("owned").await.unwrap());

        assert!(provider.delete_if_eq("owned", "me").await.unwrap());
        assert!(!provider.exists("owned").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_if_eq_only_refreshes_matching_live_value() {
        let provider = make_provider();
        provider
            .set("owned", "me", Duration::from_secs(30))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(
            !provider
                .expire_if_eq("owned", "someone-else", Duration::from_secs(30))
                .await
                .unwrap()
        );
        assert!(
            provider
                .expire_if_eq("owned", "me", Duration::from_secs(30))
                .await
                .unwrap()
        );

        // Past the original TTL, alive on the refreshed one.
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(provider.get("owned").await.unwrap(), Some("me".to_string()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(
            !provider
                .expire_if_eq("owned", "me", Duration::from_secs(30))
                .await
                .unwrap()
        );
        assert!(!provider.exists("owned").await.unwrap());
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let provider = MemoryCacheProvider::new(&MemoryCacheConfig { max_capacity: 1 });
        provider
            .set_nx("one", "a", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(
            provider
                .set_nx("two", "b", Duration::from_secs(60))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let provider = make_provider();
        assert!(provider.health_check().await.unwrap());
    }
}
