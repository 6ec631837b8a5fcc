//! Job definitions and the handler trait.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::JobContext;
use crate::error::JobError;

/// Business logic invoked by the scheduler on each fire.
#[async_trait]
pub trait JobHandler: Send + Sync + fmt::Debug + 'static {
    /// Run one execution. Report progress through `ctx`.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        (self.f)(ctx.clone()).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Static registration record for one named job.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    /// Unique name; also the lock key.
    pub name: String,
    /// Six-field cron expression (seconds resolution).
    pub schedule: String,
    /// Handler invoked on each fire.
    pub handler: Arc<dyn JobHandler>,
    /// Disabled definitions are never scheduled.
    pub enabled: bool,
    /// How long the scheduler waits for the handler. Zero waits forever.
    pub timeout: Duration,
}

impl JobDefinition {
    /// Create an enabled, unbounded definition.
    pub fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            handler,
            enabled: true,
            timeout: Duration::ZERO,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The timeout as an optional deadline.
    pub fn deadline(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}
