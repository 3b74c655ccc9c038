//! Node-store operation metrics, grounded in the same sink-trait shape used
//! for plugin host metrics: a no-op default for production until wired to a
//! real registry, and an in-memory sink tests can assert against.

use std::collections::HashMap;

use parking_lot::Mutex;

pub trait ArchonMetricsSink: Send + Sync {
    fn record_mutation(&self, operation: &str);
    fn record_mutation_error(&self, operation: &str, error_code: &str);
}

#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl ArchonMetricsSink for NoopMetricsSink {
    fn record_mutation(&self, _operation: &str) {}
    fn record_mutation_error(&self, _operation: &str, _error_code: &str) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestMetricsSnapshot {
    pub mutation_count: u64,
    pub error_counts_by_code: HashMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct TestMetricsSink {
    inner: Mutex<HashMap<String, TestMetricsSnapshot>>,
}

impl TestMetricsSink {
    #[must_use]
    pub fn snapshot_for(&self, operation: &str) -> TestMetricsSnapshot {
        self.inner.lock().get(operation).cloned().unwrap_or_default()
    }
}

impl ArchonMetricsSink for TestMetricsSink {
    fn record_mutation(&self, operation: &str) {
        let mut inner = self.inner.lock();
        inner.entry(operation.to_owned()).or_default().mutation_count += 1;
    }

    fn record_mutation_error(&self, operation: &str, error_code: &str) {
        let mut inner = self.inner.lock();
        let entry = inner.entry(operation.to_owned()).or_default();
        *entry.error_counts_by_code.entry(error_code.to_owned()).or_insert(0) += 1;
    }
}
