//! Core traits defined in `helpdesk-core` and implemented by other crates.

pub mod cache;

pub use cache::CacheProvider;
