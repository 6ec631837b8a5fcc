//! Job execution entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::ExecutionStatus;

/// One invocation of a scheduled job that acquired the job's lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobExecution {
    /// Unique execution identifier.
    pub id: Uuid,
    /// Name of the job definition that ran.
    pub job_name: String,
    /// Identity of the process that ran it (`hostname-pid`).
    pub instance_id: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// When the handler was started.
    pub started_at: DateTime<Utc>,
    /// When the execution finished (None while running).
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds (None while running).
    pub duration_ms: Option<i64>,
    /// Counter reported by the handler.
    pub records_processed: i64,
    /// Failure message, set only when `status` is `Failed`.
    pub error: Option<String>,
    /// Handler-supplied diagnostic key/values, serialized as a JSON object.
    pub metadata: Option<String>,
}

impl JobExecution {
    /// Build a fresh `Running` execution for `job_name` started now.
    pub fn start(job_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_name: job_name.into(),
            instance_id: instance_id.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            records_processed: 0,
            error: None,
            metadata: None,
        }
    }

    /// Move the execution to its terminal state.
    ///
    /// `outcome` is `Err(message)` for a failed run.
    pub fn finish(
        &mut self,
        outcome: Result<(), String>,
        duration_ms: i64,
        records_processed: i64,
        metadata: Option<String>,
    ) {
        self.completed_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
        self.records_processed = records_processed;
        self.metadata = metadata;
        match outcome {
            Ok(()) => {
                self.status = ExecutionStatus::Completed;
                self.error = None;
            }
            Err(message) => {
                self.status = ExecutionStatus::Failed;
                self.error = Some(message);
            }
        }
    }

    /// Decode the metadata column into a JSON object, if present and valid.
    pub fn metadata_map(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// Check if the execution has finished.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_running_without_completion() {
        let execution = JobExecution::start("digest_emails", "host-1");
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(execution.completed_at.is_none());
        assert!(execution.duration_ms.is_none());
        assert!(!execution.is_finished());
    }

    #[test]
    fn test_finish_failed_sets_error() {
        let mut execution = JobExecution::start("digest_emails", "host-1");
        execution.finish(Err("smtp unreachable".to_string()), 12, 3, None);

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.error.as_deref(), Some("smtp unreachable"));
        assert_eq!(execution.records_processed, 3);
        assert!(execution.completed_at.unwrap() >= execution.started_at);
    }

    #[test]
    fn test_metadata_map_ignores_garbage() {
        let mut execution = JobExecution::start("digest_emails", "host-1");
        execution.metadata = Some("not json".to_string());
        assert!(execution.metadata_map().is_none());

        execution.metadata = Some(r#"{"batch":4}"#.to_string());
        let map = execution.metadata_map().unwrap();
        assert_eq!(map["batch"], 4);
    }
}
