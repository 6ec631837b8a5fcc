//! Key builders for entries written to the lock store.
//!
//! The Redis provider adds the configured deployment prefix on top of these.

/// Namespace for distributed job locks.
const JOB_LOCK_NAMESPACE: &str = "lock:job:";

/// Key holding the owner of a job's lock.
pub fn job_lock(job_name: &str) -> String {
    format!("{JOB_LOCK_NAMESPACE}{job_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lock_key() {
        assert_eq!(job_lock("sla_breach_sweep"), "lock:job:sla_breach_sweep");
    }
}
