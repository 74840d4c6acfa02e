//! Observability ports for tool execution
//!
//! The executor reports through two narrow ports so any backend can be plugged in:
//! - [`ToolMetrics`]: latency histogram, error counter and cache-hit counter
//! - [`AttemptLogger`]: one structured [`AttemptRecord`] per attempt
//!
//! Adapters: [`PrometheusToolMetrics`] (the `tool_*` metric family),
//! [`TracingAttemptLogger`] (structured `tracing` events), [`RecordingSink`]
//! (in-memory, for assertions) and the no-op pair.

mod logging;
mod prometheus_metrics;
mod recording;

pub use logging::TracingAttemptLogger;
pub use prometheus_metrics::{PrometheusToolMetrics, LATENCY_BUCKETS_MS};
pub use recording::{LatencyRecord, RecordingSink};

use crate::error::ErrorReason;
use crate::executor::ToolContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Outcome label for latency records and attempt logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Tool function returned a value
    Success,
    /// Served from cache without calling the tool
    CacheHit,
    /// Attempt exceeded the hard timeout
    Timeout,
    /// Tool function returned an error
    Error,
    /// Cancellation observed at a checkpoint
    Cancelled,
    /// Breaker rejected the call
    CircuitOpen,
}

impl Outcome {
    /// Label value exported on `tool_latency_ms{outcome}`
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::CacheHit => "cache_hit",
            Outcome::Timeout => "timeout",
            Outcome::Error => "error",
            Outcome::Cancelled => "cancelled",
            Outcome::CircuitOpen => "circuit_open",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record emitted once per attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Trace identifier from the caller's context
    pub trace_id: String,
    /// Run identifier, when the call belongs to a run
    pub run_id: Option<String>,
    /// Tool name
    pub tool: String,
    /// 1-based attempt number; 0 for records emitted before any attempt
    pub attempt: u32,
    /// What happened
    pub outcome: Outcome,
    /// Latency in milliseconds, rounded to two decimals
    pub latency_ms: f64,
    /// Whether the value came from cache
    pub cache_hit: bool,
    /// Failure label, if any
    pub error_reason: Option<String>,
}

/// Metrics port
pub trait ToolMetrics: Send + Sync {
    /// Observe one latency sample
    fn record_latency(&self, tool: &str, outcome: Outcome, latency_ms: f64);

    /// Increment the error counter
    fn inc_error(&self, tool: &str, reason: ErrorReason);

    /// Increment the cache-hit counter
    fn inc_cache_hit(&self, tool: &str);
}

/// Structured log port
pub trait AttemptLogger: Send + Sync {
    /// Emit one attempt record
    fn log_attempt(&self, record: &AttemptRecord);
}

/// Metrics that go nowhere
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopToolMetrics;

impl ToolMetrics for NoopToolMetrics {
    fn record_latency(&self, _tool: &str, _outcome: Outcome, _latency_ms: f64) {}
    fn inc_error(&self, _tool: &str, _reason: ErrorReason) {}
    fn inc_cache_hit(&self, _tool: &str) {}
}

/// Logger that goes nowhere
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAttemptLogger;

impl AttemptLogger for NoopAttemptLogger {
    fn log_attempt(&self, _record: &AttemptRecord) {}
}

/// The pair of ports an executor reports through
#[derive(Clone)]
pub struct ObservabilitySink {
    metrics: Arc<dyn ToolMetrics>,
    logger: Arc<dyn AttemptLogger>,
}

impl Default for ObservabilitySink {
    /// No metrics backend; attempts logged through `tracing`
    fn default() -> Self {
        Self::new(Arc::new(NoopToolMetrics), Arc::new(TracingAttemptLogger))
    }
}

impl std::fmt::Debug for ObservabilitySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilitySink").finish_non_exhaustive()
    }
}

impl ObservabilitySink {
    /// Combine a metrics backend and a logger
    pub fn new(metrics: Arc<dyn ToolMetrics>, logger: Arc<dyn AttemptLogger>) -> Self {
        Self { metrics, logger }
    }

    /// Discard everything
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopToolMetrics), Arc::new(NoopAttemptLogger))
    }

    /// Use one object for both ports
    pub fn unified<S>(sink: Arc<S>) -> Self
    where
        S: ToolMetrics + AttemptLogger + 'static,
    {
        Self::new(sink.clone(), sink)
    }

    pub(crate) fn into_parts(self) -> (Arc<dyn ToolMetrics>, Arc<dyn AttemptLogger>) {
        (self.metrics, self.logger)
    }

    /// Record latency and emit the attempt log
    pub(crate) fn attempt(
        &self,
        ctx: &ToolContext,
        attempt: u32,
        outcome: Outcome,
        latency: Duration,
        error_reason: Option<&str>,
    ) {
        let latency_ms = (latency.as_secs_f64() * 1000.0 * 100.0).round() / 100.0;
        self.metrics.record_latency(&ctx.tool_name, outcome, latency_ms);
        self.logger.log_attempt(&AttemptRecord {
            trace_id: ctx.trace_id.clone(),
            run_id: ctx.run_id.clone(),
            tool: ctx.tool_name.clone(),
            attempt,
            outcome,
            latency_ms,
            cache_hit: outcome == Outcome::CacheHit,
            error_reason: error_reason.map(str::to_string),
        });
    }

    pub(crate) fn error(&self, tool: &str, reason: ErrorReason) {
        self.metrics.inc_error(tool, reason);
    }

    pub(crate) fn cache_hit(&self, tool: &str) {
        self.metrics.inc_cache_hit(tool);
    }
}
