//! A spawned handler run with an explicit handle.
//!
//! A deadline only stops the scheduler from waiting. The handler task is
//! never aborted; its cancellation token is cancelled so handlers that
//! check it can stop early, and the still-running task is handed back to
//! the caller as [`TaskOutcome::Abandoned`].

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::context::JobContext;
use crate::definition::JobHandler;
use crate::error::JobError;

/// Handler execution running on its own tokio task.
#[derive(Debug)]
pub struct JobTask {
    handle: JoinHandle<Result<(), JobError>>,
    cancellation: CancellationToken,
}

/// Result of waiting on a [`JobTask`].
#[derive(Debug)]
pub enum TaskOutcome {
    /// The handler returned (or panicked) before the deadline.
    Completed(Result<(), JobError>),
    /// The deadline passed first. The task keeps running unsupervised.
    Abandoned { deadline: Duration, task: JobTask },
}

impl TaskOutcome {
    /// Collapse into the result recorded for the execution.
    pub fn into_result(self) -> Result<(), JobError> {
        match self {
            Self::Completed(result) => result,
            Self::Abandoned { deadline, .. } => Err(JobError::DeadlineExceeded(deadline)),
        }
    }
}

impl JobTask {
    /// Spawn `handler` with `ctx` on the current runtime.
    pub fn spawn(handler: Arc<dyn JobHandler>, ctx: JobContext) -> Self {
        let cancellation = ctx.cancellation_token().clone();
        let handle = tokio::spawn(async move { handler.execute(&ctx).await });
        Self {
            handle,
            cancellation,
        }
    }

    /// Whether the handler has finished, including after abandonment.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Wait for the handler, giving up after `deadline` if one is set.
    pub async fn join(mut self, deadline: Option<Duration>) -> TaskOutcome {
        let Some(deadline) = deadline else {
            let joined = (&mut self.handle).await;
            return TaskOutcome::Completed(flatten(joined));
        };

        match tokio::time::timeout(deadline, &mut self.handle).await {
            Ok(joined) => TaskOutcome::Completed(flatten(joined)),
            Err(_) => {
                self.cancellation.cancel();
                TaskOutcome::Abandoned {
                    deadline,
                    task: self,
                }
            }
        }
    }

    /// Wait for an abandoned handler to actually finish.
    pub async fn wait_detached(self) -> Result<(), JobError> {
        flatten(self.handle.await)
    }
}

fn flatten(joined: Result<Result<(), JobError>, JoinError>) -> Result<(), JobError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(JobError::Panicked(panic_message(e.into_panic()))),
        Err(_) => Err(JobError::Cancelled),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::handler_fn;
    use uuid::Uuid;

    fn ctx() -> JobContext {
        JobContext::new("digest", Uuid::now_v7())
    }

    #[tokio::test]
    async fn test_completed_without_deadline() {
        let handler = handler_fn(|ctx: JobContext| async move {
            ctx.set_processed(3);
            Ok(())
        });
        let ctx = ctx();
        let outcome = JobTask::spawn(handler, ctx.clone()).join(None).await;
        assert!(outcome.into_result().is_ok());
        assert_eq!(ctx.processed(), 3);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let handler = handler_fn(|_ctx: JobContext| async move {
            if true {
                panic!("exploded");
            }
            Ok(())
        });
        let err = JobTask::spawn(handler, ctx())
            .join(Some(Duration::from_secs(1)))
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "job panicked: exploded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_but_does_not_abort() {
        let handler = handler_fn(|ctx: JobContext| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ctx.set_processed(1);
            Ok(())
        });
        let ctx = ctx();
        let outcome = JobTask::spawn(handler, ctx.clone())
            .join(Some(Duration::from_millis(50)))
            .await;

        let TaskOutcome::Abandoned { deadline, task } = outcome else {
            panic!("expected the deadline to win");
        };
        assert_eq!(deadline, Duration::from_millis(50));
        assert!(ctx.is_cancelled());
        assert!(!task.is_finished());

        assert!(task.wait_detached().await.is_ok());
        assert_eq!(ctx.processed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_handler_stops_on_cancel() {
        let handler = handler_fn(|ctx: JobContext| async move {
            tokio::select! {
                _ = ctx.cancellation_token().cancelled() => Err(JobError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(()),
            }
        });
        let outcome = JobTask::spawn(handler, ctx())
            .join(Some(Duration::from_millis(10)))
            .await;
        let TaskOutcome::Abandoned { task, .. } = outcome else {
            panic!("expected the deadline to win");
        };
        assert!(matches!(task.wait_detached().await, Err(JobError::Cancelled)));
    }
}
