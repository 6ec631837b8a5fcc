//! Cluster-wide, TTL-bounded mutual exclusion keyed by job name.
//!
//! Correctness rests entirely on the store's atomic `set_nx`. The TTL is
//! crash recovery only: a holder that dies without unlocking frees the lock
//! once the TTL lapses.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use helpdesk_cache::keys;
use helpdesk_core::result::AppResult;
use helpdesk_core::traits::cache::CacheProvider;

use crate::instance::InstanceId;

/// Default lock lifetime when the holder never releases it.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30 * 60);

/// Distributed lock manager bound to one process identity.
#[derive(Debug, Clone)]
pub struct LockManager {
    /// Backing key-value store shared by every instance.
    store: Arc<dyn CacheProvider>,
    /// Value written into every lock this manager takes.
    instance_id: InstanceId,
    /// Lock lifetime.
    ttl: Duration,
}

impl LockManager {
    /// Create a lock manager with the default TTL.
    pub fn new(store: Arc<dyn CacheProvider>, instance_id: InstanceId) -> Self {
        Self {
            store,
            instance_id,
            ttl: DEFAULT_LOCK_TTL,
        }
    }

    /// Override the lock TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Identity this manager writes as lock owner.
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Configured lock lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lock for `job_name` without waiting.
    ///
    /// Returns `true` when the lock was created, or when this instance
    /// already held it (the TTL is then reset). Returns `false` when another
    /// instance owns it.
    pub async fn try_lock(&self, job_name: &str) -> AppResult<bool> {
        let key = keys::job_lock(job_name);
        let me = self.instance_id.as_str();

        if self.store.set_nx(&key, me, self.ttl).await? {
            debug!(job = %job_name, instance = %me, "Lock acquired");
            return Ok(true);
        }

        match self.store.get(&key).await? {
            Some(owner) if owner == me => {
                if self.store.expire_if_eq(&key, me, self.ttl).await? {
                    debug!(job = %job_name, instance = %me, "Lock refreshed");
                    return Ok(true);
                }
                // Expired after the read; another instance may have taken it.
                let acquired = self.store.set_nx(&key, me, self.ttl).await?;
                debug!(job = %job_name, acquired, "Lock lapsed during refresh, retried once");
                Ok(acquired)
            }
            Some(owner) => {
                debug!(job = %job_name, owner = %owner, "Lock held by another instance");
                Ok(false)
            }
            // Expired or released between the two calls.
            None => {
                let acquired = self.store.set_nx(&key, me, self.ttl).await?;
                debug!(job = %job_name, acquired, "Lock vanished during acquire, retried once");
                Ok(acquired)
            }
        }
    }

    /// Release the lock for `job_name` if this instance owns it.
    ///
    /// Never removes a lock owned by someone else. Store failures are logged
    /// and swallowed; the TTL reclaims the key eventually. Returns whether a
    /// lock was actually released.
    pub async fn unlock(&self, job_name: &str) -> bool {
        let key = keys::job_lock(job_name);
        let me = self.instance_id.as_str();

        match self.store.get(&key).await {
            Ok(Some(owner)) if owner == me => {}
            Ok(Some(owner)) => {
                debug!(job = %job_name, owner = %owner, "Not releasing lock owned by another instance");
                return false;
            }
            Ok(None) => return false,
            Err(e) => {
                warn!(job = %job_name, error = %e, "Failed to read lock owner, leaving lock to expire");
                return false;
            }
        }

        match self.store.delete_if_eq(&key, me).await {
            Ok(released) => {
                debug!(job = %job_name, released, "Lock released");
                released
            }
            Err(e) => {
                warn!(job = %job_name, error = %e, "Failed to release lock, leaving it to expire");
                false
            }
        }
    }

    /// Whether any instance currently holds the lock.
    pub async fn is_locked(&self, job_name: &str) -> AppResult<bool> {
        self.store.exists(&keys::job_lock(job_name)).await
    }

    /// Current owner of the lock, if held.
    pub async fn get_lock_owner(&self, job_name: &str) -> AppResult<Option<InstanceId>> {
        let owner = self.store.get(&keys::job_lock(job_name)).await?;
        Ok(owner.map(InstanceId::from))
    }

    /// Remove the lock regardless of owner. Administrative use only.
    pub async fn force_unlock(&self, job_name: &str) -> AppResult<Option<InstanceId>> {
        let key = keys::job_lock(job_name);
        let owner = self.store.get(&key).await?;
        if let Some(owner) = &owner {
            if !self.store.delete_if_eq(&key, owner).await? {
                // Owner changed under us; report the stale read as nothing removed.
                return Ok(None);
            }
            warn!(job = %job_name, owner = %owner, "Lock forcibly removed");
        }
        Ok(owner.map(InstanceId::from))
    }

    /// Take the lock and wrap it in a guard that releases it when dropped.
    pub async fn try_acquire(self: &Arc<Self>, job_name: &str) -> AppResult<Option<LockGuard>> {
        if self.try_lock(job_name).await? {
            Ok(Some(LockGuard {
                manager: Arc::clone(self),
                job_name: job_name.to_string(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Held job lock. Release it with [`LockGuard::release`]; a guard dropped
/// without release schedules the unlock on the current runtime.
#[derive(Debug)]
pub struct LockGuard {
    manager: Arc<LockManager>,
    job_name: String,
    released: bool,
}

impl LockGuard {
    /// Name of the locked job.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Release the lock now.
    pub async fn release(mut self) -> bool {
        self.released = true;
        self.manager.unlock(&self.job_name).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let manager = Arc::clone(&self.manager);
        let job_name = std::mem::take(&mut self.job_name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    manager.unlock(&job_name).await;
                });
            }
            Err(_) => {
                warn!(job = %job_name, "Lock guard dropped outside a runtime, lock left to expire");
            }
        }
    }
}
