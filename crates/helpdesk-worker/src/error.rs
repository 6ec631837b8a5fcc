//! Errors produced by job handlers and the task boundary.

use std::time::Duration;

use helpdesk_core::error::AppError;

/// Outcome of a failed job run. The display string is what lands in the
/// execution record's `error` column.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Handler reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The scheduler stopped waiting for the handler.
    #[error("deadline exceeded after {}ms", .0.as_millis())]
    DeadlineExceeded(Duration),

    /// Handler panicked; the panic was contained at the task boundary.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// Handler observed its cancellation token and gave up.
    #[error("job cancelled")]
    Cancelled,

    /// Application error raised inside the handler.
    #[error(transparent)]
    Internal(#[from] AppError),
}

impl JobError {
    /// Build a handler failure from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether the run ended because of the deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded(_))
    }
}
