//! In-memory job execution store for single-node deployments and tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use helpdesk_core::error::AppError;
use helpdesk_core::result::AppResult;
use helpdesk_entity::job::JobExecution;

use crate::repositories::job_execution::JobExecutionStore;

/// Execution store kept in process memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobExecutionStore {
    rows: Arc<RwLock<Vec<JobExecution>>>,
}

impl MemoryJobExecutionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored execution, in insertion order.
    pub async fn all(&self) -> Vec<JobExecution> {
        self.rows.read().await.clone()
    }

    /// Number of stored executions.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Whether the store holds no executions.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl JobExecutionStore for MemoryJobExecutionStore {
    async fn create(&self, execution: &JobExecution) -> AppResult<()> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|row| row.id == execution.id) {
            return Err(AppError::conflict(format!(
                "Job execution {} already exists",
                execution.id
            )));
        }
        rows.push(execution.clone());
        Ok(())
    }

    async fn save(&self, execution: &JobExecution) -> AppResult<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|row| row.id == execution.id) {
            Some(row) => {
                *row = execution.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!(
                "Job execution {} not found",
                execution.id
            ))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<JobExecution>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    async fn find_recent(&self, job_name: &str, limit: usize) -> AppResult<Vec<JobExecution>> {
        let rows = self.rows.read().await;
        // Reverse first so that equal start times keep newest-inserted first.
        let mut matching: Vec<JobExecution> = rows
            .iter()
            .rev()
            .filter(|row| row.job_name == job_name)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn delete_started_before(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut rows = self.rows.write().await;
        let initial = rows.len();
        rows.retain(|row| row.started_at >= before);
        Ok((initial - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn execution_at(job: &str, minutes_ago: i64) -> JobExecution {
        let mut execution = JobExecution::start(job, "test-host-1");
        execution.started_at = Utc::now() - Duration::minutes(minutes_ago);
        execution
    }

    #[tokio::test]
    async fn test_find_recent_orders_newest_first() {
        let store = MemoryJobExecutionStore::new();
        store.create(&execution_at("sla_sweep", 30)).await.unwrap();
        store.create(&execution_at("sla_sweep", 5)).await.unwrap();
        store.create(&execution_at("other", 1)).await.unwrap();
        store.create(&execution_at("sla_sweep", 10)).await.unwrap();

        let recent = store.find_recent("sla_sweep", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].started_at > recent[1].started_at);
        assert!(recent.iter().all(|e| e.job_name == "sla_sweep"));

        let last = store.find_last("sla_sweep").await.unwrap().unwrap();
        assert_eq!(last.id, recent[0].id);
    }

    #[tokio::test]
    async fn test_save_unknown_execution_is_not_found() {
        let store = MemoryJobExecutionStore::new();
        let execution = JobExecution::start("sla_sweep", "test-host-1");
        assert!(store.save(&execution).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_started_before() {
        let store = MemoryJobExecutionStore::new();
        store.create(&execution_at("sla_sweep", 60 * 24 * 40)).await.unwrap();
        store.create(&execution_at("sla_sweep", 60 * 24 * 31)).await.unwrap();
        store.create(&execution_at("sla_sweep", 60)).await.unwrap();

        let removed = store
            .delete_started_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len().await, 1);
    }
}
