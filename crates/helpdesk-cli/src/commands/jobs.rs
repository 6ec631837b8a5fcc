//! Job history, lock, and retention commands.

use std::time::Duration;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use helpdesk_core::config::AppConfig;
use helpdesk_core::error::AppError;
use helpdesk_entity::job::JobExecution;
use helpdesk_worker::retention_cutoff;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Arguments for job commands
#[derive(Debug, Args)]
pub struct JobsArgs {
    /// Jobs subcommand
    #[command(subcommand)]
    pub command: JobsCommand,
}

/// Jobs subcommands
#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// Show recent executions of a job, newest first
    History {
        /// Job name
        name: String,
        /// Maximum number of executions to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the most recent execution of a job
    Last {
        /// Job name
        name: String,
    },
    /// Show who holds the lock for each job
    Locks {
        /// Job names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Remove a job lock regardless of its owner
    Unlock {
        /// Job name
        name: String,
        /// Required: the owning instance may still be running the job
        #[arg(long)]
        force: bool,
    },
    /// Delete executions older than the given age
    Cleanup {
        /// Age threshold in days
        #[arg(long)]
        older_than_days: u32,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Execution display row
#[derive(Debug, Serialize, Tabled)]
struct ExecutionRow {
    /// Execution ID
    id: String,
    /// Status
    status: String,
    /// Instance
    instance: String,
    /// Started
    started: String,
    /// Duration (ms)
    duration_ms: String,
    /// Records
    records: i64,
    /// Error
    error: String,
}

impl From<&JobExecution> for ExecutionRow {
    fn from(e: &JobExecution) -> Self {
        Self {
            id: e.id.to_string(),
            status: e.status.to_string(),
            instance: e.instance_id.clone(),
            started: e.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration_ms: e.duration_ms.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            records: e.records_processed,
            error: e.error.clone().unwrap_or_default(),
        }
    }
}

/// Lock display row
#[derive(Debug, Serialize, Tabled)]
struct LockRow {
    /// Job
    job: String,
    /// Locked
    locked: String,
    /// Owner
    owner: String,
}

/// Execute job commands
pub async fn execute(
    args: &JobsArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        JobsCommand::History { name, limit } => {
            let store = super::connect_db(config).await?.execution_store();
            let executions = store.find_recent(name, *limit).await?;
            let rows: Vec<ExecutionRow> = executions.iter().map(ExecutionRow::from).collect();
            output::print_list(&rows, format);
        }
        JobsCommand::Last { name } => {
            let store = super::connect_db(config).await?.execution_store();
            let Some(e) = store.find_last(name).await? else {
                output::print_warning(&format!("Job '{name}' has no recorded executions"));
                return Ok(());
            };

            output::print_fields(
                &[
                    ("Execution", e.id.to_string()),
                    ("Job", e.job_name.clone()),
                    ("Status", e.status.to_string()),
                    ("Instance", e.instance_id.clone()),
                    ("Started", e.started_at.to_rfc3339()),
                    (
                        "Completed",
                        e.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    ),
                    (
                        "Duration (ms)",
                        e.duration_ms.map(|d| d.to_string()).unwrap_or_default(),
                    ),
                    ("Records", e.records_processed.to_string()),
                    ("Error", e.error.clone().unwrap_or_default()),
                    ("Metadata", e.metadata.clone().unwrap_or_default()),
                ],
                format,
            );
        }
        JobsCommand::Locks { names } => {
            let locks = super::connect_locks(config).await?;
            let mut rows = Vec::with_capacity(names.len());
            for name in names {
                let owner = locks.get_lock_owner(name).await?;
                rows.push(LockRow {
                    job: name.clone(),
                    locked: if owner.is_some() { "yes" } else { "no" }.to_string(),
                    owner: owner.map(|o| o.to_string()).unwrap_or_default(),
                });
            }
            output::print_list(&rows, format);
        }
        JobsCommand::Unlock { name, force } => {
            let locks = super::connect_locks(config).await?;
            let Some(owner) = locks.get_lock_owner(name).await? else {
                output::print_warning(&format!("Job '{name}' is not locked"));
                return Ok(());
            };
            if !force {
                return Err(AppError::validation(format!(
                    "Job '{name}' is locked by {owner}; pass --force to remove the lock anyway"
                )));
            }

            match locks.force_unlock(name).await? {
                Some(removed) => {
                    output::print_success(&format!("Removed lock on '{name}' held by {removed}"))
                }
                None => output::print_warning(&format!(
                    "Lock on '{name}' changed owner while unlocking; nothing removed"
                )),
            }
        }
        JobsCommand::Cleanup {
            older_than_days,
            yes,
        } => {
            let prompt = format!("Delete job executions started more than {older_than_days} days ago?");
            if !output::confirm(&prompt, *yes)? {
                println!("Cancelled.");
                return Ok(());
            }

            let store = super::connect_db(config).await?.execution_store();
            let age = Duration::from_secs(u64::from(*older_than_days) * SECS_PER_DAY);
            let removed = store.delete_started_before(retention_cutoff(age)).await?;
            output::print_success(&format!("Deleted {removed} job executions"));
        }
    }

    Ok(())
}
