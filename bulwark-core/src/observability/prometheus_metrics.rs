//! Prometheus adapter
//!
//! Metric names and label sets are consumed by dashboards and alerts and must not
//! change: `tool_latency_ms{tool, outcome}`, `tool_errors_total{tool, reason}`,
//! `tool_cache_hits_total{tool}`.

use super::{Outcome, ToolMetrics};
use crate::error::{BulwarkError, ErrorReason, Result};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Histogram buckets for `tool_latency_ms`
pub const LATENCY_BUCKETS_MS: [f64; 9] = [10.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];

/// Prometheus-backed [`ToolMetrics`]
#[derive(Clone)]
pub struct PrometheusToolMetrics {
    registry: Registry,
    latency: HistogramVec,
    errors: IntCounterVec,
    cache_hits: IntCounterVec,
}

impl PrometheusToolMetrics {
    /// Register the tool metrics in a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register the tool metrics in an existing registry
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let latency = HistogramVec::new(
            HistogramOpts::new("tool_latency_ms", "Tool execution latency in milliseconds")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["tool", "outcome"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("tool_errors_total", "Total tool execution errors"),
            &["tool", "reason"],
        )?;
        let cache_hits = IntCounterVec::new(
            Opts::new("tool_cache_hits_total", "Total tool cache hits"),
            &["tool"],
        )?;

        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;

        Ok(Self {
            registry,
            latency,
            errors,
            cache_hits,
        })
    }

    /// Registry holding the tool metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the text exposition format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| BulwarkError::Other(e.to_string()))
    }

    /// Current `tool_errors_total{tool, reason}`
    pub fn error_count(&self, tool: &str, reason: ErrorReason) -> u64 {
        self.errors.with_label_values(&[tool, reason.as_str()]).get()
    }

    /// Current `tool_cache_hits_total{tool}`
    pub fn cache_hit_count(&self, tool: &str) -> u64 {
        self.cache_hits.with_label_values(&[tool]).get()
    }

    /// Samples observed by `tool_latency_ms{tool, outcome}`
    pub fn latency_sample_count(&self, tool: &str, outcome: Outcome) -> u64 {
        self.latency
            .with_label_values(&[tool, outcome.as_str()])
            .get_sample_count()
    }
}

impl std::fmt::Debug for PrometheusToolMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusToolMetrics").finish_non_exhaustive()
    }
}

impl ToolMetrics for PrometheusToolMetrics {
    fn record_latency(&self, tool: &str, outcome: Outcome, latency_ms: f64) {
        self.latency
            .with_label_values(&[tool, outcome.as_str()])
            .observe(latency_ms);
    }

    fn inc_error(&self, tool: &str, reason: ErrorReason) {
        self.errors.with_label_values(&[tool, reason.as_str()]).inc();
    }

    fn inc_cache_hit(&self, tool: &str) {
        self.cache_hits.with_label_values(&[tool]).inc();
    }
}
