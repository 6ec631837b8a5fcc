//! # helpdesk-database
//!
//! PostgreSQL connection management and the job execution store, with an
//! in-memory implementation of the same store for single-node runs and tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use memory::MemoryJobExecutionStore;
pub use repositories::job_execution::{JobExecutionRepository, JobExecutionStore};
