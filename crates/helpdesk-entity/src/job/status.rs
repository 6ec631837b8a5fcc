//! Job execution status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one job execution.
///
/// An execution is created `Running` and moves exactly once to
/// `Completed` or `Failed`. A row left `Running` after its process died
/// is kept as an audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_execution_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The handler is executing (or its process died mid-run).
    Running,
    /// The handler returned successfully.
    Completed,
    /// The handler returned an error, panicked, or exceeded its timeout.
    Failed,
}

impl ExecutionStatus {
    /// Check if the execution is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
