//! Process identity used as the lock owner value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies the process that holds a lock or ran an execution.
///
/// Derived once per process from `hostname-pid`; stable for the process
/// lifetime. Two distinct values never compare equal, which is what lets a
/// [`LockManager`](crate::lock::LockManager) tell re-entrant refresh apart
/// from genuine contention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Derive the identity of the current process.
    pub fn current() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        Self(format!("{host}-{}", std::process::id()))
    }

    /// Use the configured override when present, else derive from the process.
    pub fn from_config(configured: Option<&str>) -> Self {
        match configured.map(str::trim) {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self::current(),
        }
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_ends_with_pid() {
        let id = InstanceId::current();
        let suffix = format!("-{}", std::process::id());
        assert!(id.as_str().ends_with(&suffix));
        assert_eq!(id, InstanceId::current());
    }

    #[test]
    fn test_from_config_override() {
        assert_eq!(InstanceId::from_config(Some("worker-a")).as_str(), "worker-a");
        assert_eq!(InstanceId::from_config(Some("  ")), InstanceId::current());
        assert_eq!(InstanceId::from_config(None), InstanceId::current());
    }
}
