//! Cron-driven job scheduler with distributed locking.
//!
//! Each fire runs under the job's cluster-wide lock: lock, record a
//! `Running` execution, run the handler (bounded by the optional timeout),
//! record the outcome, unlock. A fire that finds the lock held elsewhere is
//! skipped without an execution record.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info, warn};

use helpdesk_core::error::AppError;
use helpdesk_core::result::AppResult;
use helpdesk_database::repositories::job_execution::JobExecutionStore;
use helpdesk_entity::job::JobExecution;

use crate::context::JobContext;
use crate::definition::JobDefinition;
use crate::health::{HEALTH_WINDOW, JobHealth, SchedulerHealth};
use crate::instance::InstanceId;
use crate::lock::LockManager;
use crate::task::{JobTask, TaskOutcome};

/// What happened to one triggered run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No enabled job with that name is registered.
    NotRegistered,
    /// Another instance holds the lock; nothing ran.
    LockContested,
    /// The lock store could not be reached; nothing ran.
    LockUnavailable,
    /// The `Running` record could not be created; the handler never ran.
    TrackingFailed,
    /// The handler ran. The execution is in its terminal state.
    Finished(JobExecution),
}

impl RunOutcome {
    /// The finished execution, if the handler ran.
    pub fn execution(&self) -> Option<&JobExecution> {
        match self {
            Self::Finished(execution) => Some(execution),
            _ => None,
        }
    }
}

/// Handle to a run started with [`Scheduler::run_now`].
///
/// Dropping it leaves the run going in the background.
#[derive(Debug)]
pub struct TriggeredRun {
    job_name: String,
    handle: JoinHandle<RunOutcome>,
}

impl TriggeredRun {
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to complete.
    pub async fn outcome(self) -> AppResult<RunOutcome> {
        self.handle.await.map_err(|e| {
            AppError::internal(format!("Run of job '{}' did not complete: {e}", self.job_name))
        })
    }
}

/// Lock state of one registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobLockStatus {
    pub job_name: String,
    pub locked: bool,
    pub owner: Option<InstanceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

struct SchedulerInner {
    /// Enabled job definitions by name.
    registry: RwLock<HashMap<String, JobDefinition>>,
    cron: JobScheduler,
    locks: Arc<LockManager>,
    store: Arc<dyn JobExecutionStore>,
    state: Mutex<SchedulerState>,
}

/// Owns the job registry and the cron engine.
///
/// Construct one per process and share it by cloning; clones refer to the
/// same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("instance_id", self.inner.locks.instance_id())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a stopped scheduler.
    pub async fn new(locks: Arc<LockManager>, store: Arc<dyn JobExecutionStore>) -> AppResult<Self> {
        let cron = JobScheduler::new()
            .await
            .map_err(|e| AppError::scheduler(format!("Failed to create scheduler: {e}")))?;

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                registry: RwLock::new(HashMap::new()),
                cron,
                locks,
                store,
                state: Mutex::new(SchedulerState::Idle),
            }),
        })
    }

    /// Register a job with the cron engine.
    ///
    /// Disabled definitions are accepted and ignored. A malformed schedule
    /// or a duplicate name is an error and nothing is scheduled.
    pub async fn register_job(&self, definition: JobDefinition) -> AppResult<()> {
        if !definition.enabled {
            info!(job = %definition.name, "Job disabled, not scheduling");
            return Ok(());
        }
        if definition.name.trim().is_empty() {
            return Err(AppError::validation("Job name must not be empty"));
        }

        let weak: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        let name = definition.name.clone();
        let cron_job = CronJob::new_async(definition.schedule.as_str(), move |_uuid, _lock| {
            let weak = weak.clone();
            let name = name.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.run_job(&name).await;
                }
            })
        })
        .map_err(|e| {
            AppError::validation(format!(
                "Invalid schedule '{}' for job '{}': {e}",
                definition.schedule, definition.name
            ))
        })?;

        let mut registry = self.inner.registry.write().await;
        if registry.contains_key(&definition.name) {
            return Err(AppError::conflict(format!(
                "Job '{}' is already registered",
                definition.name
            )));
        }

        self.inner.cron.add(cron_job).await.map_err(|e| {
            AppError::scheduler(format!(
                "Failed to add schedule for job '{}': {e}",
                definition.name
            ))
        })?;

        info!(
            job = %definition.name,
            schedule = %definition.schedule,
            timeout_ms = definition.timeout.as_millis() as u64,
            "Registered job"
        );
        registry.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Trigger one run of `job_name` outside its schedule.
    ///
    /// Returns `None` without doing anything if the job is not registered.
    /// The run goes through the same lock and bookkeeping as a cron fire.
    pub async fn run_now(&self, job_name: &str) -> Option<TriggeredRun> {
        if !self.inner.registry.read().await.contains_key(job_name) {
            debug!(job = %job_name, "Run requested for unregistered job");
            return None;
        }

        let inner = Arc::clone(&self.inner);
        let name = job_name.to_string();
        let handle = tokio::spawn(async move { inner.run_job(&name).await });
        info!(job = %job_name, "Job triggered manually");
        Some(TriggeredRun {
            job_name: job_name.to_string(),
            handle,
        })
    }

    /// Start cron dispatch. A second call is a no-op.
    pub async fn start(&self) -> AppResult<()> {
        let mut state = self.inner.state.lock().await;
        match *state {
            SchedulerState::Running => return Ok(()),
            SchedulerState::Stopped => {
                return Err(AppError::conflict("Scheduler cannot be restarted after stop"));
            }
            SchedulerState::Idle => {}
        }

        self.inner
            .cron
            .start()
            .await
            .map_err(|e| AppError::scheduler(format!("Failed to start scheduler: {e}")))?;
        *state = SchedulerState::Running;

        info!(
            instance = %self.inner.locks.instance_id(),
            jobs = self.inner.registry.read().await.len(),
            "Scheduler started"
        );
        Ok(())
    }

    /// Stop cron dispatch and wait for the engine to shut down.
    ///
    /// Runs already in flight are not cancelled. A second call is a no-op.
    pub async fn stop(&self) -> AppResult<()> {
        let mut state = self.inner.state.lock().await;
        if *state != SchedulerState::Running {
            return Ok(());
        }

        let mut cron = self.inner.cron.clone();
        cron.shutdown()
            .await
            .map_err(|e| AppError::scheduler(format!("Failed to stop scheduler: {e}")))?;
        *state = SchedulerState::Stopped;

        info!(instance = %self.inner.locks.instance_id(), "Scheduler stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.inner.state.lock().await == SchedulerState::Running
    }

    /// Registered definitions, sorted by name.
    pub async fn get_jobs(&self) -> Vec<JobDefinition> {
        let mut jobs: Vec<JobDefinition> =
            self.inner.registry.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    pub async fn get_recent_executions(
        &self,
        job_name: &str,
        limit: usize,
    ) -> AppResult<Vec<JobExecution>> {
        self.inner.store.find_recent(job_name, limit).await
    }

    pub async fn get_last_execution(&self, job_name: &str) -> AppResult<Option<JobExecution>> {
        self.inner.store.find_last(job_name).await
    }

    /// Delete execution records started more than `older_than` ago.
    pub async fn cleanup_old_executions(&self, older_than: Duration) -> AppResult<u64> {
        let removed = delete_executions_older_than(self.inner.store.as_ref(), older_than).await?;
        info!(removed, older_than_secs = older_than.as_secs(), "Cleaned up old job executions");
        Ok(removed)
    }

    /// Lock state of every registered job.
    pub async fn lock_status(&self) -> AppResult<Vec<JobLockStatus>> {
        let mut statuses = Vec::new();
        for job in self.get_jobs().await {
            let owner = self.inner.locks.get_lock_owner(&job.name).await?;
            statuses.push(JobLockStatus {
                job_name: job.name,
                locked: owner.is_some(),
                owner,
            });
        }
        Ok(statuses)
    }

    /// Health of one registered job, `None` if unknown.
    pub async fn job_health(&self, job_name: &str) -> AppResult<Option<JobHealth>> {
        if !self.inner.registry.read().await.contains_key(job_name) {
            return Ok(None);
        }
        let recent = self.inner.store.find_recent(job_name, HEALTH_WINDOW).await?;
        Ok(Some(JobHealth::from_recent(job_name, recent)))
    }

    /// Health of every registered job.
    pub async fn health(&self) -> AppResult<SchedulerHealth> {
        let mut jobs = Vec::new();
        for job in self.get_jobs().await {
            let recent = self.inner.store.find_recent(&job.name, HEALTH_WINDOW).await?;
            jobs.push(JobHealth::from_recent(&job.name, recent));
        }
        Ok(SchedulerHealth::from_jobs(jobs))
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.inner.locks
    }

    pub fn instance_id(&self) -> &InstanceId {
        self.inner.locks.instance_id()
    }
}

impl SchedulerInner {
    /// One fire of `job_name`. Never panics; every exit releases the lock.
    async fn run_job(&self, job_name: &str) -> RunOutcome {
        let definition = self.registry.read().await.get(job_name).cloned();
        let Some(definition) = definition else {
            warn!(job = %job_name, "Fired job is not registered");
            return RunOutcome::NotRegistered;
        };

        let guard = match self.locks.try_acquire(job_name).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!(job = %job_name, "Lock held by another instance, skipping run");
                return RunOutcome::LockContested;
            }
            Err(e) => {
                error!(job = %job_name, error = %e, "Lock store unavailable, skipping run");
                return RunOutcome::LockUnavailable;
            }
        };

        let outcome = self.execute(&definition).await;
        guard.release().await;
        outcome
    }

    async fn execute(&self, definition: &JobDefinition) -> RunOutcome {
        let mut execution =
            JobExecution::start(&definition.name, self.locks.instance_id().as_str());
        if let Err(e) = self.store.create(&execution).await {
            error!(
                job = %definition.name,
                execution_id = %execution.id,
                error = %e,
                "Failed to record job start, aborting run"
            );
            return RunOutcome::TrackingFailed;
        }

        let ctx = JobContext::new(&definition.name, execution.id);
        let started = Instant::now();
        debug!(job = %definition.name, execution_id = %execution.id, "Job started");

        let outcome = JobTask::spawn(Arc::clone(&definition.handler), ctx.clone())
            .join(definition.deadline())
            .await;
        if let TaskOutcome::Abandoned { deadline, .. } = &outcome {
            warn!(
                job = %definition.name,
                execution_id = %execution.id,
                timeout_ms = deadline.as_millis() as u64,
                "Job exceeded its timeout; handler left running in the background"
            );
        }
        let result = outcome.into_result();
        let duration_ms = started.elapsed().as_millis() as i64;

        match &result {
            Ok(()) => info!(
                job = %definition.name,
                execution_id = %execution.id,
                duration_ms,
                records_processed = ctx.processed(),
                "Job completed"
            ),
            Err(e) => warn!(
                job = %definition.name,
                execution_id = %execution.id,
                duration_ms,
                error = %e,
                "Job failed"
            ),
        }

        execution.finish(
            result.map_err(|e| e.to_string()),
            duration_ms,
            ctx.processed(),
            ctx.metadata_json(),
        );
        if let Err(e) = self.store.save(&execution).await {
            error!(
                job = %definition.name,
                execution_id = %execution.id,
                error = %e,
                "Failed to record job outcome"
            );
        }

        RunOutcome::Finished(execution)
    }
}

/// Start time before which an execution counts as older than `older_than`.
///
/// Never earlier than the Unix epoch, so ages reaching further back match
/// nothing and the cutoff stays within Postgres' timestamp range.
pub fn retention_cutoff(older_than: Duration) -> DateTime<Utc> {
    // `DateTime<Utc>::default()` is the Unix epoch.
    let epoch = DateTime::<Utc>::default();
    chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .map_or(epoch, |cutoff| cutoff.max(epoch))
}

/// Delete executions started more than `older_than` ago.
pub(crate) async fn delete_executions_older_than(
    store: &dyn JobExecutionStore,
    older_than: Duration,
) -> AppResult<u64> {
    store.delete_started_before(retention_cutoff(older_than)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_cache::memory::MemoryCacheProvider;
    use helpdesk_core::error::ErrorKind;
    use helpdesk_core::traits::cache::CacheProvider;
    use helpdesk_database::MemoryJobExecutionStore;

    use crate::definition::handler_fn;

    async fn scheduler() -> Scheduler {
        let cache: Arc<dyn CacheProvider> = Arc::new(MemoryCacheProvider::default());
        let locks = Arc::new(LockManager::new(cache, InstanceId::from("host-a-1")));
        Scheduler::new(locks, Arc::new(MemoryJobExecutionStore::new()))
            .await
            .unwrap()
    }

    fn noop(name: &str) -> JobDefinition {
        JobDefinition::new(name, "0 0 3 29 2 *", handler_fn(|_| async { Ok(()) }))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_schedule_is_validation_error() {
        let scheduler = scheduler().await;
        let def = JobDefinition::new("bad", "not a cron", handler_fn(|_| async { Ok(()) }));
        let err = scheduler.register_job(def).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(scheduler.get_jobs().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_name_rejected() {
        let scheduler = scheduler().await;
        scheduler.register_job(noop("digest")).await.unwrap();
        let err = scheduler.register_job(noop("digest")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(scheduler.get_jobs().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disabled_job_not_registered() {
        let scheduler = scheduler().await;
        scheduler
            .register_job(noop("digest").with_enabled(false))
            .await
            .unwrap();
        assert!(scheduler.get_jobs().await.is_empty());
        assert!(scheduler.run_now("digest").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_now_unknown_job() {
        let scheduler = scheduler().await;
        assert!(scheduler.run_now("missing").await.is_none());
        assert!(scheduler.job_health("missing").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_jobs_sorted() {
        let scheduler = scheduler().await;
        scheduler.register_job(noop("zeta")).await.unwrap();
        scheduler.register_job(noop("alpha")).await.unwrap();
        let names: Vec<String> = scheduler
            .get_jobs()
            .await
            .into_iter()
            .map(|j| j.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_before_start_is_noop() {
        let scheduler = scheduler().await;
        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running().await);
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running().await);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_after_stop_rejected() {
        let scheduler = scheduler().await;
        scheduler.start().await.unwrap();
        scheduler.stop().await.unwrap();
        let err = scheduler.start().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[test]
    fn test_retention_cutoff_clamps_huge_ages() {
        let millennia = Duration::from_secs(1_000_000 * 365 * 24 * 3600);
        assert_eq!(retention_cutoff(millennia).timestamp(), 0);
        assert_eq!(retention_cutoff(Duration::MAX).timestamp(), 0);

        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        let cutoff = retention_cutoff(Duration::from_secs(3600));
        assert!((cutoff - hour_ago).num_seconds().abs() <= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lock_status_reports_owner() {
        let scheduler = scheduler().await;
        scheduler.register_job(noop("digest")).await.unwrap();
        assert!(scheduler.lock_manager().try_lock("digest").await.unwrap());

        let status = scheduler.lock_status().await.unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].locked);
        assert_eq!(status[0].owner, Some(InstanceId::from("host-a-1")));
    }
}
