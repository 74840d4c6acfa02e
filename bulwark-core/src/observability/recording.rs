//! In-memory adapter that keeps everything it is told

use super::{AttemptLogger, AttemptRecord, Outcome, ToolMetrics};
use crate::error::ErrorReason;
use parking_lot::Mutex;
use std::collections::HashMap;

/// One observed latency sample
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyRecord {
    pub tool: String,
    pub outcome: Outcome,
    pub latency_ms: f64,
}

#[derive(Debug, Default)]
struct Recorded {
    latencies: Vec<LatencyRecord>,
    errors: HashMap<(String, ErrorReason), u64>,
    cache_hits: HashMap<String, u64>,
    attempts: Vec<AttemptRecord>,
}

/// Records metrics and attempt logs in memory.
///
/// Implements both [`ToolMetrics`] and [`AttemptLogger`]; wire it in with
/// [`ObservabilitySink::unified`](super::ObservabilitySink::unified).
#[derive(Debug, Default)]
pub struct RecordingSink {
    inner: Mutex<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All latency samples in arrival order
    pub fn latencies(&self) -> Vec<LatencyRecord> {
        self.inner.lock().latencies.clone()
    }

    /// Latency outcomes recorded for one tool, in order
    pub fn outcomes(&self, tool: &str) -> Vec<Outcome> {
        self.inner
            .lock()
            .latencies
            .iter()
            .filter(|r| r.tool == tool)
            .map(|r| r.outcome)
            .collect()
    }

    /// Error-counter value for `(tool, reason)`
    pub fn error_count(&self, tool: &str, reason: ErrorReason) -> u64 {
        self.inner
            .lock()
            .errors
            .get(&(tool.to_string(), reason))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of error counters for a tool across reasons
    pub fn total_errors(&self, tool: &str) -> u64 {
        self.inner
            .lock()
            .errors
            .iter()
            .filter(|((t, _), _)| t == tool)
            .map(|(_, count)| count)
            .sum()
    }

    /// Cache-hit counter value for a tool
    pub fn cache_hit_count(&self, tool: &str) -> u64 {
        self.inner.lock().cache_hits.get(tool).copied().unwrap_or(0)
    }

    /// Attempt records in emission order
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.inner.lock().attempts.clone()
    }

    pub fn clear(&self) {
        *self.inner.lock() = Recorded::default();
    }
}

impl ToolMetrics for RecordingSink {
    fn record_latency(&self, tool: &str, outcome: Outcome, latency_ms: f64) {
        self.inner.lock().latencies.push(LatencyRecord {
            tool: tool.to_string(),
            outcome,
            latency_ms,
        });
    }

    fn inc_error(&self, tool: &str, reason: ErrorReason) {
        *self
            .inner
            .lock()
            .errors
            .entry((tool.to_string(), reason))
            .or_insert(0) += 1;
    }

    fn inc_cache_hit(&self, tool: &str) {
        *self
            .inner
            .lock()
            .cache_hits
            .entry(tool.to_string())
            .or_insert(0) += 1;
    }
}

impl AttemptLogger for RecordingSink {
    fn log_attempt(&self, record: &AttemptRecord) {
        self.inner.lock().attempts.push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_tool_and_reason() {
        let sink = RecordingSink::new();
        sink.inc_error("a", ErrorReason::Timeout);
        sink.inc_error("a", ErrorReason::Timeout);
        sink.inc_error("a", ErrorReason::ExecutionError);
        sink.inc_error("b", ErrorReason::Timeout);
        sink.inc_cache_hit("a");

        assert_eq!(sink.error_count("a", ErrorReason::Timeout), 2);
        assert_eq!(sink.total_errors("a"), 3);
        assert_eq!(sink.total_errors("b"), 1);
        assert_eq!(sink.cache_hit_count("a"), 1);
        assert_eq!(sink.cache_hit_count("b"), 0);

        sink.clear();
        assert_eq!(sink.total_errors("a"), 0);
    }
}
