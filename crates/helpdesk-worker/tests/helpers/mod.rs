//! Shared test helpers for worker integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use helpdesk_cache::memory::MemoryCacheProvider;
use helpdesk_core::error::AppError;
use helpdesk_core::result::AppResult;
use helpdesk_core::traits::cache::CacheProvider;
use helpdesk_database::{JobExecutionStore, MemoryJobExecutionStore};
use helpdesk_entity::job::JobExecution;
use helpdesk_worker::{InstanceId, LockManager, Scheduler};

/// A lock store and an execution store shared by any number of simulated instances.
pub struct TestCluster {
    pub cache: Arc<dyn CacheProvider>,
    pub store: FlakyStore,
}

impl TestCluster {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(MemoryCacheProvider::default()),
            store: FlakyStore::default(),
        }
    }

    /// Lock manager for the instance named `instance`.
    pub fn lock_manager(&self, instance: &str) -> LockManager {
        LockManager::new(Arc::clone(&self.cache), InstanceId::from(instance))
    }

    /// Fresh scheduler for the instance named `instance`.
    pub async fn scheduler(&self, instance: &str) -> Scheduler {
        Scheduler::new(
            Arc::new(self.lock_manager(instance)),
            Arc::new(self.store.clone()),
        )
        .await
        .expect("Failed to create scheduler")
    }

    pub async fn executions(&self) -> Vec<JobExecution> {
        self.store.inner.all().await
    }
}

/// Counts how many times a handler was entered.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-memory execution store whose writes can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryJobExecutionStore,
    fail_create: Arc<AtomicBool>,
    fail_save: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobExecutionStore for FlakyStore {
    async fn create(&self, execution: &JobExecution) -> AppResult<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::database("insert rejected"));
        }
        self.inner.create(execution).await
    }

    async fn save(&self, execution: &JobExecution) -> AppResult<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(AppError::database("update rejected"));
        }
        self.inner.save(execution).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<JobExecution>> {
        self.inner.find_by_id(id).await
    }

    async fn find_recent(&self, job_name: &str, limit: usize) -> AppResult<Vec<JobExecution>> {
        self.inner.find_recent(job_name, limit).await
    }

    async fn delete_started_before(&self, before: DateTime<Utc>) -> AppResult<u64> {
        self.inner.delete_started_before(before).await
    }
}
