use serde::{Deserialize, Serialize};

/// Per-invocation identity, built by the caller for each call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolContext {
    /// Tool name; keys the breaker, the cache and every metric label
    pub tool_name: String,

    /// Trace ID for correlation
    pub trace_id: String,

    /// Run the call belongs to, if any
    pub run_id: Option<String>,
}

impl ToolContext {
    /// Create a context for one call of `tool_name`
    pub fn new(tool_name: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            trace_id: trace_id.into(),
            run_id: None,
        }
    }

    /// Set run ID
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}
