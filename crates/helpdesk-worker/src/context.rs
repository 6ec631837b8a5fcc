//! Per-execution context handed to job handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mutable state a handler reports back to the scheduler.
///
/// Clones share the same counters, so a handler that outlives its deadline
/// can keep writing without racing the scheduler, which only reads them
/// once the handler has returned or the deadline has passed.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_name: Arc<str>,
    execution_id: Uuid,
    processed: Arc<AtomicI64>,
    metadata: Arc<DashMap<String, Value>>,
    cancellation: CancellationToken,
}

impl JobContext {
    /// Create a context for one execution.
    pub fn new(job_name: &str, execution_id: Uuid) -> Self {
        Self {
            job_name: Arc::from(job_name),
            execution_id,
            processed: Arc::new(AtomicI64::new(0)),
            metadata: Arc::new(DashMap::new()),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Overwrite the processed-record counter.
    pub fn set_processed(&self, count: i64) {
        self.processed.store(count, Ordering::Relaxed);
    }

    /// Add to the processed-record counter, returning the new total.
    pub fn add_processed(&self, delta: i64) -> i64 {
        self.processed.fetch_add(delta, Ordering::Relaxed) + delta
    }

    pub fn processed(&self) -> i64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Attach a diagnostic value to the execution record.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata_value(&self, key: &str) -> Option<Value> {
        self.metadata.get(key).map(|v| v.value().clone())
    }

    /// Snapshot of the metadata bag, keys sorted.
    pub fn metadata_snapshot(&self) -> Map<String, Value> {
        self.metadata
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Metadata serialized for storage; `None` when nothing was set.
    pub fn metadata_json(&self) -> Option<String> {
        if self.metadata.is_empty() {
            return None;
        }
        serde_json::to_string(&self.metadata_snapshot()).ok()
    }

    /// Token cancelled when the scheduler stops waiting for this run.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_shared_across_clones() {
        let ctx = JobContext::new("digest", Uuid::now_v7());
        let handler_view = ctx.clone();
        handler_view.set_processed(5);
        assert_eq!(handler_view.add_processed(2), 7);
        assert_eq!(ctx.processed(), 7);
    }

    #[test]
    fn test_metadata_json() {
        let ctx = JobContext::new("digest", Uuid::now_v7());
        assert_eq!(ctx.metadata_json(), None);

        ctx.set_metadata("k", "v");
        ctx.set_metadata("batch", 3);
        assert_eq!(ctx.metadata_json().unwrap(), r#"{"batch":3,"k":"v"}"#);
        assert_eq!(ctx.metadata_value("k"), Some(Value::from("v")));
    }

    #[test]
    fn test_cancellation_visible_to_clones() {
        let ctx = JobContext::new("digest", Uuid::now_v7());
        let handler_view = ctx.clone();
        ctx.cancellation_token().cancel();
        assert!(handler_view.is_cancelled());
    }
}
