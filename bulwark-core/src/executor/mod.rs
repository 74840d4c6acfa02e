//! Resilient tool executor
//!
//! [`ToolExecutor::execute`] wraps one external call with, in order:
//! - a cancellation checkpoint
//! - a content-addressed cache lookup (served even while the breaker is open)
//! - the per-tool circuit breaker
//! - bounded attempts, each under a fresh hard timeout
//! - jittered backoff between attempts, with cancellation checkpoints around it
//! - provenance on the returned value
//!
//! Cancellation is cooperative: the token is polled at checkpoints and never raced
//! against an in-flight call.

mod context;

pub use context::ToolContext;

use crate::breaker::BreakerRegistry;
use crate::cache::{content_digest, ContentCache};
use crate::cancel::CancelToken;
use crate::config::ToolConfig;
use crate::error::{ErrorReason, ToolError};
use crate::observability::{AttemptLogger, ObservabilitySink, Outcome, ToolMetrics};
use crate::provenance::{Provenance, ToolResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A tool expressed as a type instead of a closure
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Input accepted by the tool
    type Payload: Serialize + Clone + Send + Sync + 'static;

    /// Value produced by the tool
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Tool name used for breaker, cache and metrics
    fn name(&self) -> &str;

    /// Perform the call
    async fn call(&self, payload: Self::Payload) -> anyhow::Result<Self::Output>;
}

/// Why a single attempt failed
enum AttemptFailure {
    Timeout,
    Execution(anyhow::Error),
}

impl AttemptFailure {
    fn reason(&self) -> ErrorReason {
        match self {
            AttemptFailure::Timeout => ErrorReason::Timeout,
            AttemptFailure::Execution(_) => ErrorReason::ExecutionError,
        }
    }

    fn outcome(&self) -> Outcome {
        match self {
            AttemptFailure::Timeout => Outcome::Timeout,
            AttemptFailure::Execution(_) => Outcome::Error,
        }
    }

    fn into_error(self, tool: &str, timeout: Duration, attempts: u32) -> ToolError {
        match self {
            AttemptFailure::Timeout => ToolError::Timeout {
                tool: tool.to_string(),
                timeout,
                attempts,
            },
            AttemptFailure::Execution(source) => ToolError::Execution {
                tool: tool.to_string(),
                attempts,
                source: source.into(),
            },
        }
    }
}

/// Executes tool calls with timeouts, retries, a per-tool breaker and a result cache
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    cache: Arc<ContentCache>,
    breakers: Arc<BreakerRegistry>,
    sink: ObservabilitySink,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor {
    /// Executor on the process-wide breaker registry, with a private cache, no
    /// metrics backend and `tracing` attempt logs
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a customised executor
    pub fn builder() -> ToolExecutorBuilder {
        ToolExecutorBuilder::default()
    }

    /// Result cache used by this executor
    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Breaker registry used by this executor
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// True unless the tool's breaker is open; unknown tools are healthy
    pub fn is_healthy(&self, tool_name: &str) -> bool {
        self.breakers.is_healthy(tool_name)
    }

    /// Run `f(payload)` under the resilience policy in `config`.
    ///
    /// Returns the value with provenance, or one of the four [`ToolError`] kinds.
    /// Timeouts and tool errors are retried up to `config.retry_count()` times; the
    /// last failure is returned once the budget is spent. Breaker rejections and
    /// cancellations are returned immediately.
    pub async fn execute<P, R, E, F, Fut>(
        &self,
        ctx: &ToolContext,
        config: &ToolConfig,
        f: F,
        payload: P,
        cancel: &CancelToken,
    ) -> Result<ToolResult<R>, ToolError>
    where
        P: Serialize + Clone,
        R: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
        F: Fn(P) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let tool = ctx.tool_name.as_str();
        let started = Instant::now();

        if cancel.is_cancelled() {
            return Err(self.cancelled(ctx, 0, started.elapsed()));
        }

        let cache_key = match ContentCache::key(tool, &payload) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(tool, error = %e, "payload not serializable, bypassing cache");
                None
            }
        };

        if let Some(key) = cache_key.as_deref() {
            if let Some(hit) = self.lookup_cached::<R>(tool, key) {
                self.sink.cache_hit(tool);
                self.sink
                    .attempt(ctx, 0, Outcome::CacheHit, started.elapsed(), None);
                return Ok(hit);
            }
        }

        let breaker = self.breakers.get_or_create(tool, config.breaker_config());
        let Some(mut permit) = breaker.try_acquire() else {
            let reason = ErrorReason::CircuitOpen;
            self.sink.error(tool, reason);
            self.sink.attempt(
                ctx,
                0,
                Outcome::CircuitOpen,
                started.elapsed(),
                Some(reason.as_str()),
            );
            return Err(ToolError::CircuitOpen {
                tool: tool.to_string(),
            });
        };

        let max_attempts = config.retry_count().saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                return Err(self.cancelled(ctx, attempt - 1, started.elapsed()));
            }

            let attempt_started = Instant::now();
            let failure = match tokio::time::timeout(config.hard_timeout(), f(payload.clone())).await {
                Ok(Ok(value)) => {
                    permit.record_success();
                    self.sink
                        .attempt(ctx, attempt, Outcome::Success, attempt_started.elapsed(), None);
                    return Ok(self.finish(tool, config, cache_key, value));
                }
                Ok(Err(e)) => AttemptFailure::Execution(e.into()),
                Err(_) => AttemptFailure::Timeout,
            };

            let elapsed = attempt_started.elapsed();
            permit.record_failure();
            let reason = failure.reason();
            self.sink.error(tool, reason);
            self.sink
                .attempt(ctx, attempt, failure.outcome(), elapsed, Some(reason.as_str()));

            if attempt >= max_attempts {
                return Err(failure.into_error(tool, config.hard_timeout(), attempt));
            }

            if cancel.is_cancelled() {
                return Err(self.cancelled(ctx, attempt, started.elapsed()));
            }

            let backoff = config.sample_jitter();
            tracing::debug!(
                tool,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "retrying tool after failure"
            );
            tokio::time::sleep(backoff).await;

            if cancel.is_cancelled() {
                return Err(self.cancelled(ctx, attempt, started.elapsed()));
            }
        }
    }

    /// Run a [`ToolHandler`] under the resilience policy in `config`
    pub async fn execute_handler<H: ToolHandler>(
        &self,
        handler: &H,
        trace_id: impl Into<String>,
        run_id: Option<String>,
        config: &ToolConfig,
        payload: H::Payload,
        cancel: &CancelToken,
    ) -> Result<ToolResult<H::Output>, ToolError> {
        let ctx = ToolContext {
            tool_name: handler.name().to_string(),
            trace_id: trace_id.into(),
            run_id,
        };
        self.execute(&ctx, config, |p| handler.call(p), payload, cancel)
            .await
    }

    fn lookup_cached<R: DeserializeOwned>(&self, tool: &str, key: &str) -> Option<ToolResult<R>> {
        let entry = self.cache.get(key)?;
        match serde_json::from_value::<R>(entry.value.clone()) {
            Ok(value) => {
                let provenance = Provenance::new(tool)
                    .with_ref_id(key)
                    .with_fetched_at(entry.fetched_at)
                    .with_cache_hit(true)
                    .with_response_digest(content_digest(&entry.value));
                Some(ToolResult::new(value, provenance))
            }
            Err(e) => {
                tracing::warn!(tool, error = %e, "cached value does not fit result type, dropping entry");
                self.cache.invalidate(key);
                None
            }
        }
    }

    fn finish<R: Serialize>(
        &self,
        tool: &str,
        config: &ToolConfig,
        cache_key: Option<String>,
        value: R,
    ) -> ToolResult<R> {
        let fetched_at = Utc::now();
        let mut provenance = Provenance::new(tool).with_fetched_at(fetched_at);

        match serde_json::to_value(&value) {
            Ok(json) => {
                provenance = provenance.with_response_digest(content_digest(&json));
                if let Some(key) = cache_key {
                    provenance = provenance.with_ref_id(key.clone());
                    self.cache.set(key, json, config.cache_ttl(), fetched_at);
                }
            }
            Err(e) => {
                tracing::warn!(tool, error = %e, "result not serializable, skipping cache");
                if let Some(key) = cache_key {
                    provenance = provenance.with_ref_id(key);
                }
            }
        }

        ToolResult::new(value, provenance)
    }

    fn cancelled(&self, ctx: &ToolContext, attempts: u32, elapsed: Duration) -> ToolError {
        self.sink
            .attempt(ctx, attempts, Outcome::Cancelled, elapsed, Some("cancelled"));
        ToolError::Cancelled {
            tool: ctx.tool_name.clone(),
            attempts,
        }
    }
}

/// Builder for [`ToolExecutor`]
#[derive(Default)]
pub struct ToolExecutorBuilder {
    cache: Option<Arc<ContentCache>>,
    breakers: Option<Arc<BreakerRegistry>>,
    metrics: Option<Arc<dyn ToolMetrics>>,
    logger: Option<Arc<dyn AttemptLogger>>,
}

impl ToolExecutorBuilder {
    /// Share a cache with other executors
    pub fn cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a specific breaker registry instead of the process-wide one
    pub fn breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// Set the metrics backend
    pub fn metrics(mut self, metrics: Arc<dyn ToolMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the attempt logger
    pub fn logger(mut self, logger: Arc<dyn AttemptLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set both ports at once
    pub fn sink(mut self, sink: ObservabilitySink) -> Self {
        let (metrics, logger) = sink.into_parts();
        self.metrics = Some(metrics);
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> ToolExecutor {
        let (default_metrics, default_logger) = ObservabilitySink::default().into_parts();
        let sink = ObservabilitySink::new(
            self.metrics.unwrap_or(default_metrics),
            self.logger.unwrap_or(default_logger),
        );

        ToolExecutor {
            cache: self.cache.unwrap_or_default(),
            breakers: self.breakers.unwrap_or_else(BreakerRegistry::global),
            sink,
        }
    }
}
