//! # helpdesk-cache
//!
//! Key-value providers used as the backing store for distributed job locks.
//! Supports two modes:
//!
//! - **memory**: In-process store using [dashmap](https://crates.io/crates/dashmap),
//!   suitable for a single instance and for tests
//! - **redis**: Redis-backed store using the [redis](https://crates.io/crates/redis) crate,
//!   shared by every instance of the service
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::CacheManager;
