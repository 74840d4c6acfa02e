//! `tracing` adapter for attempt records

use super::{AttemptLogger, AttemptRecord, Outcome};

/// Emits each attempt as a structured `tracing` event.
///
/// Successes and cache hits log at `info`; every other outcome logs at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAttemptLogger;

impl AttemptLogger for TracingAttemptLogger {
    fn log_attempt(&self, record: &AttemptRecord) {
        let run_id = record.run_id.as_deref().unwrap_or("");
        match record.outcome {
            Outcome::Success | Outcome::CacheHit => {
                tracing::info!(
                    trace_id = %record.trace_id,
                    run_id,
                    tool = %record.tool,
                    attempt = record.attempt,
                    outcome = record.outcome.as_str(),
                    latency_ms = record.latency_ms,
                    cache_hit = record.cache_hit,
                    "Tool execution: {} - {}",
                    record.tool,
                    record.outcome
                );
            }
            _ => {
                tracing::warn!(
                    trace_id = %record.trace_id,
                    run_id,
                    tool = %record.tool,
                    attempt = record.attempt,
                    outcome = record.outcome.as_str(),
                    latency_ms = record.latency_ms,
                    cache_hit = record.cache_hit,
                    error_reason = record.error_reason.as_deref().unwrap_or(""),
                    "Tool execution: {} - {}",
                    record.tool,
                    record.outcome
                );
            }
        }
    }
}
