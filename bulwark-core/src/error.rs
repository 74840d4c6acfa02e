//! Error types for Bulwark operations

use std::time::Duration;

/// Result type for Bulwark operations
pub type Result<T> = std::result::Result<T, BulwarkError>;

/// Crate-level errors (configuration loading, metrics registration, IO)
#[derive(Debug, thiserror::Error)]
pub enum BulwarkError {
    /// Configuration could not be loaded or merged
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration values violate an invariant
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Tool execution failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for BulwarkError {
    fn from(s: String) -> Self {
        BulwarkError::Other(s)
    }
}

impl From<&str> for BulwarkError {
    fn from(s: &str) -> Self {
        BulwarkError::Other(s.to_string())
    }
}

impl From<figment::Error> for BulwarkError {
    fn from(err: figment::Error) -> Self {
        BulwarkError::Configuration(err.to_string())
    }
}

/// Violations of [`ToolConfig`](crate::config::ToolConfig) invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Lower jitter bound is above the upper bound
    #[error("jitter_min ({min:?}) must not exceed jitter_max ({max:?})")]
    JitterBounds {
        /// Configured lower bound
        min: Duration,
        /// Configured upper bound
        max: Duration,
    },

    /// Hard timeout of zero would fail every attempt
    #[error("hard_timeout must be greater than zero")]
    ZeroHardTimeout,

    /// Breaker threshold of zero would open before any call
    #[error("breaker_failure_threshold must be at least 1")]
    ZeroFailureThreshold,
}

/// Reason label used by the error counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    /// Hard timeout exceeded
    Timeout,
    /// Tool function returned an error
    ExecutionError,
    /// Breaker rejected the call
    CircuitOpen,
}

impl ErrorReason {
    /// Label value exported on `tool_errors_total{reason}`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::Timeout => "timeout",
            ErrorReason::ExecutionError => "execution_error",
            ErrorReason::CircuitOpen => "circuit_open",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by [`ToolExecutor::execute`](crate::executor::ToolExecutor::execute).
///
/// Each variant is a distinct terminal condition. `Timeout` and `Execution` are only
/// returned after the retry budget is spent; `CircuitOpen` and `Cancelled` are never
/// retried by the executor.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Hard timeout exceeded on the final attempt
    #[error("tool {tool} timed out after {attempts} attempt(s) ({timeout:?} per attempt)")]
    Timeout {
        /// Tool name
        tool: String,
        /// Per-attempt deadline that was exceeded
        timeout: Duration,
        /// Attempts made
        attempts: u32,
    },

    /// Breaker rejected the call before any attempt
    #[error("circuit breaker open for tool {tool}")]
    CircuitOpen {
        /// Tool name
        tool: String,
    },

    /// Cancellation observed at a checkpoint
    #[error("tool {tool} cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Tool name
        tool: String,
        /// Attempts that had started before cancellation was observed
        attempts: u32,
    },

    /// Non-timeout failure on the final attempt
    #[error("tool {tool} failed after {attempts} attempt(s): {source}")]
    Execution {
        /// Tool name
        tool: String,
        /// Attempts made
        attempts: u32,
        /// Error returned by the tool function on the final attempt
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl ToolError {
    /// Tool name the error refers to
    pub fn tool(&self) -> &str {
        match self {
            ToolError::Timeout { tool, .. }
            | ToolError::CircuitOpen { tool }
            | ToolError::Cancelled { tool, .. }
            | ToolError::Execution { tool, .. } => tool,
        }
    }

    /// Error-counter reason, if this failure is counted
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            ToolError::Timeout { .. } => Some(ErrorReason::Timeout),
            ToolError::Execution { .. } => Some(ErrorReason::ExecutionError),
            ToolError::CircuitOpen { .. } => Some(ErrorReason::CircuitOpen),
            ToolError::Cancelled { .. } => None,
        }
    }

    /// Whether a caller may reasonably try again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolError::Timeout { .. } | ToolError::Execution { .. } | ToolError::CircuitOpen { .. }
        )
    }

    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }

    /// Check if the breaker rejected the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ToolError::CircuitOpen { .. })
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolError::Cancelled { .. })
    }

    /// Check if the tool function itself failed
    pub fn is_execution(&self) -> bool {
        matches!(self, ToolError::Execution { .. })
    }
}
