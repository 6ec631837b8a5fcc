//! Execution history retention job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use helpdesk_core::config::RetentionConfig;
use helpdesk_database::repositories::job_execution::JobExecutionStore;

use crate::context::JobContext;
use crate::definition::{JobDefinition, JobHandler};
use crate::error::JobError;
use crate::scheduler::delete_executions_older_than;

/// Deletes execution records older than the configured age.
#[derive(Debug)]
pub struct ExecutionRetentionJob {
    /// Execution store to prune
    store: Arc<dyn JobExecutionStore>,
    /// Records started longer ago than this are removed
    max_age: Duration,
}

impl ExecutionRetentionJob {
    /// Registered job name
    pub const NAME: &'static str = "execution_retention";

    /// Create a new retention job handler
    pub fn new(store: Arc<dyn JobExecutionStore>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    /// Build the job definition from configuration
    pub fn definition(store: Arc<dyn JobExecutionStore>, config: &RetentionConfig) -> JobDefinition {
        let max_age = Duration::from_secs(u64::from(config.max_age_days) * 24 * 60 * 60);
        JobDefinition::new(
            Self::NAME,
            config.schedule.clone(),
            Arc::new(Self::new(store, max_age)),
        )
        .with_enabled(config.enabled)
        .with_timeout(Duration::from_secs(config.timeout_seconds))
    }
}

#[async_trait]
impl JobHandler for ExecutionRetentionJob {
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        tracing::info!("Running execution retention cleanup");

        let removed = delete_executions_older_than(self.store.as_ref(), self.max_age).await?;

        ctx.set_processed(removed as i64);
        ctx.set_metadata("max_age_secs", self.max_age.as_secs());

        tracing::info!("Removed {} expired job executions", removed);
        Ok(())
    }
}
