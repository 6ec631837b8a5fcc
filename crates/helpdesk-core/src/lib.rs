//! # helpdesk-core
//!
//! Core crate for the helpdesk backend. Contains the key-value store trait
//! used for distributed locking, configuration schemas, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other helpdesk crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
