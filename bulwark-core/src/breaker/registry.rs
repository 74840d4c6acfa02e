//! Process-wide breaker registry
//!
//! Every caller of a given tool must observe the same breaker, otherwise failures seen
//! by one caller never protect the others. The registry hands out one shared
//! [`CircuitBreaker`] per tool name and never drops it for the life of the registry.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

static GLOBAL_REGISTRY: Lazy<Arc<BreakerRegistry>> = Lazy::new(|| Arc::new(BreakerRegistry::new()));

/// Health view of one breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    /// Tool name
    pub tool: String,
    /// Effective state
    pub state: CircuitState,
    /// Failures inside the current window
    pub failures: usize,
    /// False only while the breaker rejects calls
    pub healthy: bool,
}

/// Map from tool name to its shared breaker
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create an empty registry (useful for isolated tests)
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every executor that is not given its own
    pub fn global() -> Arc<BreakerRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    /// Get the breaker for a tool, creating it with `config` on first use.
    ///
    /// Later calls return the existing instance even if they pass a different config;
    /// the first caller's thresholds stay in force.
    pub fn get_or_create(&self, tool_name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(tool_name) {
            return existing.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(tool_name.to_string())
            .or_insert_with(|| {
                tracing::debug!(tool = tool_name, ?config, "creating circuit breaker");
                Arc::new(CircuitBreaker::new(tool_name, config))
            })
            .clone()
    }

    /// Get the breaker for a tool if one exists
    pub fn get(&self, tool_name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(tool_name).cloned()
    }

    /// True unless the tool's breaker is open; unknown tools are healthy
    pub fn is_healthy(&self, tool_name: &str) -> bool {
        self.get(tool_name).map(|b| b.is_healthy()).unwrap_or(true)
    }

    /// Status of every known breaker, sorted by tool name
    pub fn snapshot(&self) -> Vec<BreakerStatus> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        let mut statuses: Vec<BreakerStatus> = breakers
            .iter()
            .map(|b| {
                let state = b.state();
                BreakerStatus {
                    tool: b.name().to_string(),
                    state,
                    failures: b.failure_count(),
                    healthy: state != CircuitState::Open,
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.tool.cmp(&b.tool));
        statuses
    }

    /// Number of known tools
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// Whether no breaker has been created yet
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }

    /// Drop every breaker
    pub fn clear(&self) {
        self.breakers.write().clear();
    }
}
