//! Concrete repository implementations.

pub mod job_execution;
