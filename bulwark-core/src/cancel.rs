//! Cooperative cancellation flag
//!
//! The executor polls the token at fixed checkpoints (before the call, before each
//! attempt, around each retry sleep). It is never raced against an in-flight tool
//! call, so cancelling only stops new work from starting.

use tokio_util::sync::CancellationToken;

/// Shared cancellation flag; clones observe the same flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    /// Create an uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Read the flag
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_cancelled_by_default() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let held_by_caller = token.clone();
        held_by_caller.cancel();
        assert!(token.is_cancelled());
    }
}
