//! # Bulwark - Resilient Tool Execution
//!
//! Bulwark wraps calls to external tools (HTTP APIs, computed lookups, fixtures) with:
//! - A hard timeout per attempt, with bounded jittered retries
//! - A per-tool circuit breaker shared across callers
//! - A content-addressed TTL cache
//! - Cooperative cancellation
//! - Provenance metadata on every result
//! - Latency, error and cache-hit metrics plus one structured log per attempt
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bulwark_core::prelude::*;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = BulwarkConfig::load()?;
//!     let executor = ToolExecutor::new();
//!     let ctx = ToolContext::new("weather", "trace-123");
//!
//!     let result = executor
//!         .execute(
//!             &ctx,
//!             &config.config_for("weather")?,
//!             |payload: Value| async move { Ok::<_, anyhow::Error>(json!({"city": payload["city"]})) },
//!             json!({"city": "Paris"}),
//!             &CancelToken::new(),
//!         )
//!         .await?;
//!
//!     println!("{} (cache hit: {})", result.value, result.is_cache_hit());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Breaker**: closed/open/half-open state machine over a sliding failure window,
//!   one instance per tool name held in a [`BreakerRegistry`](breaker::BreakerRegistry)
//! - **Cache**: keyed by tool name and the SHA-256 of the canonical payload
//! - **Executor**: cache, then breaker, then timed attempts with backoff
//! - **Observability**: metrics and attempt-log ports with Prometheus and `tracing` adapters

pub mod breaker;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod executor;
pub mod observability;
pub mod provenance;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::breaker::{BreakerRegistry, BreakerStatus, CircuitBreaker, CircuitState};
    pub use crate::cache::ContentCache;
    pub use crate::cancel::CancelToken;
    pub use crate::config::{BulwarkConfig, ToolConfig, ToolOverrides};
    pub use crate::error::{BulwarkError, ConfigError, ErrorReason, Result, ToolError};
    pub use crate::executor::{ToolContext, ToolExecutor, ToolHandler};
    pub use crate::observability::{
        AttemptLogger, AttemptRecord, ObservabilitySink, Outcome, PrometheusToolMetrics,
        RecordingSink, ToolMetrics, TracingAttemptLogger,
    };
    pub use crate::provenance::{Provenance, ToolResult};
}
