use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for one execution. Updated as nodes are dispatched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub messages_processed: u64,
    pub messages_emitted: u64,
    pub node_invocations: u64,
    pub component_invocations: BTreeMap<String, u64>,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub error_count: u64,
    pub backpressure_events: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(skip)]
    total_latency_ms: u64,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            messages_processed: 0,
            messages_emitted: 0,
            node_invocations: 0,
            component_invocations: BTreeMap::new(),
            avg_latency_ms: 0.0,
            max_latency_ms: 0,
            error_count: 0,
            backpressure_events: 0,
            started_at: now,
            last_activity_at: now,
            total_latency_ms: 0,
        }
    }

    pub fn record_invocation(&mut self, component: &str, latency_ms: u64, success: bool) {
        self.node_invocations += 1;
        *self
            .component_invocations
            .entry(component.to_string())
            .or_insert(0) += 1;
        self.total_latency_ms += latency_ms;
        self.avg_latency_ms = self.total_latency_ms as f64 / self.node_invocations as f64;
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);
        if !success {
            self.error_count += 1;
        }
        self.touch();
    }

    pub fn record_processed(&mut self, count: usize) {
        self.messages_processed += count as u64;
        self.touch();
    }

    pub fn record_emitted(&mut self) {
        self.messages_emitted += 1;
        self.touch();
    }

    pub fn record_backpressure(&mut self) {
        self.backpressure_events += 1;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_aggregates() {
        let mut m = ExecutionMetrics::new();
        m.record_invocation("echo", 10, true);
        m.record_invocation("echo", 30, false);
        m.record_invocation("wait", 20, true);
        assert_eq!(m.node_invocations, 3);
        assert_eq!(m.component_invocations["echo"], 2);
        assert_eq!(m.component_invocations["wait"], 1);
        assert_eq!(m.max_latency_ms, 30);
        assert!((m.avg_latency_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(m.error_count, 1);
        assert!(m.last_activity_at >= m.started_at);
    }

    #[test]
    fn test_starts_zeroed() {
        let m = ExecutionMetrics::default();
        assert_eq!(m.messages_processed, 0);
        assert_eq!(m.backpressure_events, 0);
        assert_eq!(m.avg_latency_ms, 0.0);
    }
}
