//! Background job execution entities.

pub mod model;
pub mod status;

pub use model::JobExecution;
pub use status::ExecutionStatus;
