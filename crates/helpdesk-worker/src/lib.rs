//! Distributed job locking and cron scheduling for the helpdesk backend.
//!
//! This crate provides:
//! - A lock manager giving cluster-wide mutual exclusion per job name
//! - A cron scheduler that runs each job under its lock and records every execution
//! - Built-in jobs, currently execution history retention

pub mod context;
pub mod definition;
pub mod error;
pub mod health;
pub mod instance;
pub mod jobs;
pub mod lock;
pub mod scheduler;
pub mod task;

pub use context::JobContext;
pub use definition::{JobDefinition, JobHandler, handler_fn};
pub use error::JobError;
pub use health::{HealthState, JobHealth, SchedulerHealth};
pub use instance::InstanceId;
pub use lock::{LockGuard, LockManager};
pub use scheduler::{JobLockStatus, RunOutcome, Scheduler, TriggeredRun, retention_cutoff};
pub use task::{JobTask, TaskOutcome};
