//! Per-tool circuit breakers and the registry that shares them

mod circuit_breaker;
mod registry;

pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use registry::{BreakerRegistry, BreakerStatus};
