//! Job health derived from recent execution history.

use serde::Serialize;

use helpdesk_entity::job::{ExecutionStatus, JobExecution};

/// How many recent executions are inspected when counting failures.
pub(crate) const HEALTH_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobHealth {
    pub job_name: String,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_execution: Option<JobExecution>,
}

impl JobHealth {
    /// Build from executions ordered newest first.
    pub fn from_recent(job_name: &str, recent: Vec<JobExecution>) -> Self {
        let consecutive_failures = recent
            .iter()
            .take_while(|e| e.status == ExecutionStatus::Failed)
            .count() as u32;
        let last_execution = recent.into_iter().next();
        let state = determine_health_state(last_execution.as_ref(), consecutive_failures);
        Self {
            job_name: job_name.to_string(),
            state,
            consecutive_failures,
            last_execution,
        }
    }
}

/// Aggregate over every registered job; `state` is the worst of them.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
    pub state: HealthState,
    pub jobs: Vec<JobHealth>,
}

impl SchedulerHealth {
    pub fn from_jobs(jobs: Vec<JobHealth>) -> Self {
        let state = jobs
            .iter()
            .map(|j| j.state)
            .max()
            .unwrap_or(HealthState::Healthy);
        Self { state, jobs }
    }
}

fn determine_health_state(last: Option<&JobExecution>, consecutive_failures: u32) -> HealthState {
    match last.map(|e| e.status) {
        None | Some(ExecutionStatus::Running) | Some(ExecutionStatus::Completed) => {
            HealthState::Healthy
        }
        Some(ExecutionStatus::Failed) => {
            if consecutive_failures >= 3 {
                HealthState::Unhealthy
            } else {
                HealthState::Degraded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(status: ExecutionStatus) -> JobExecution {
        let mut e = JobExecution::start("digest", "host-1");
        match status {
            ExecutionStatus::Running => {}
            ExecutionStatus::Completed => e.finish(Ok(()), 1, 0, None),
            ExecutionStatus::Failed => e.finish(Err("boom".into()), 1, 0, None),
        }
        e
    }

    #[test]
    fn test_no_history_is_healthy() {
        let health = JobHealth::from_recent("digest", vec![]);
        assert_eq!(health.state, HealthState::Healthy);
        assert!(health.last_execution.is_none());
    }

    #[test]
    fn test_one_failure_degraded() {
        let recent = vec![
            execution(ExecutionStatus::Failed),
            execution(ExecutionStatus::Completed),
            execution(ExecutionStatus::Failed),
        ];
        let health = JobHealth::from_recent("digest", recent);
        assert_eq!(health.consecutive_failures, 1);
        assert_eq!(health.state, HealthState::Degraded);
    }

    #[test]
    fn test_three_failures_unhealthy() {
        let recent = (0..3).map(|_| execution(ExecutionStatus::Failed)).collect();
        let health = JobHealth::from_recent("digest", recent);
        assert_eq!(health.consecutive_failures, 3);
        assert_eq!(health.state, HealthState::Unhealthy);
    }

    #[test]
    fn test_running_after_failures_is_healthy() {
        let recent = vec![
            execution(ExecutionStatus::Running),
            execution(ExecutionStatus::Failed),
            execution(ExecutionStatus::Failed),
            execution(ExecutionStatus::Failed),
        ];
        let health = JobHealth::from_recent("digest", recent);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.state, HealthState::Healthy);
    }

    #[test]
    fn test_aggregate_takes_worst() {
        let jobs = vec![
            JobHealth::from_recent("a", vec![execution(ExecutionStatus::Completed)]),
            JobHealth::from_recent("b", vec![execution(ExecutionStatus::Failed)]),
        ];
        assert_eq!(SchedulerHealth::from_jobs(jobs).state, HealthState::Degraded);
        assert_eq!(SchedulerHealth::from_jobs(vec![]).state, HealthState::Healthy);
    }
}
