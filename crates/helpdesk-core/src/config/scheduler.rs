//! Background job scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler and distributed lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the scheduler runs in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How long a job lock survives without being released, in seconds.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_seconds: u64,
    /// Override for the instance identity (defaults to `hostname-pid`).
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Execution history retention job.
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl SchedulerConfig {
    /// Lock TTL as a [`Duration`].
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_ttl_seconds: default_lock_ttl(),
            instance_id: None,
            retention: RetentionConfig::default(),
        }
    }
}

/// Configuration of the built-in execution history cleanup job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Whether the cleanup job is registered.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression (seconds resolution).
    #[serde(default = "default_retention_schedule")]
    pub schedule: String,
    /// Executions started longer ago than this are deleted.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    /// Upper bound on one cleanup run, in seconds (0 = unbounded).
    #[serde(default = "default_retention_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_retention_schedule(),
            max_age_days: default_max_age_days(),
            timeout_seconds: default_retention_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lock_ttl() -> u64 {
    30 * 60
}

fn default_retention_schedule() -> String {
    "0 30 3 * * *".to_string()
}

fn default_max_age_days() -> u32 {
    30
}

fn default_retention_timeout() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lock_ttl_is_thirty_minutes() {
        let config = SchedulerConfig::default();
        assert_eq!(config.lock_ttl(), Duration::from_secs(1800));
        assert!(config.instance_id.is_none());
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"retention": {"max_age_days": 7}}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.lock_ttl_seconds, 1800);
        assert_eq!(config.retention.max_age_days, 7);
        assert_eq!(config.retention.schedule, "0 30 3 * * *");
    }
}
