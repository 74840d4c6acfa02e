//! Circuit Breaker Pattern
//!
//! Tracks failures of one tool inside a sliding window and temporarily rejects calls
//! once the window holds `failure_threshold` failures. After `half_open_delay` a single
//! trial call is admitted; its outcome decides whether the circuit closes or re-opens.
//!
//! All state lives behind one mutex per breaker, so concurrent callers of the same tool
//! never race on the failure window or the half-open trial slot.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Circuit open - requests are rejected
    Open,
    /// Cooldown elapsed - one trial request decides recovery
    HalfOpen,
}

impl CircuitState {
    /// Lowercase label for logs and health output
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures inside the window before opening
    pub failure_threshold: u32,
    /// Width of the sliding failure window
    pub failure_window: Duration,
    /// Time to wait after opening before admitting a trial call
    pub half_open_delay: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            half_open_delay: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Builder: set failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Builder: set failure window
    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    /// Builder: set half-open delay
    pub fn with_half_open_delay(mut self, delay: Duration) -> Self {
        self.half_open_delay = delay;
        self
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerInner {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn cooldown_elapsed(&self, now: Instant, delay: Duration) -> bool {
        self.opened_at
            .map(|opened| now.saturating_duration_since(opened) >= delay)
            .unwrap_or(true)
    }
}

/// Circuit breaker for one logical tool
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new closed circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Tool name this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration fixed at creation
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state as a caller would experience it.
    ///
    /// An open breaker whose cooldown has elapsed reports `HalfOpen`, since the next
    /// call would be admitted as the trial.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open
                if inner.cooldown_elapsed(Instant::now(), self.config.half_open_delay) =>
            {
                CircuitState::HalfOpen
            }
            state => state,
        }
    }

    /// True unless the breaker is rejecting calls
    pub fn is_healthy(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Failures currently inside the window
    pub fn failure_count(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .failures
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.config.failure_window)
            .count()
    }

    /// Ask to run one call.
    ///
    /// Returns `None` while open (or while another caller holds the half-open trial).
    /// When the cooldown has elapsed the returned permit is the trial; dropping it
    /// without recording an outcome hands the trial slot to the next caller.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Some(BreakerPermit::new(self, false)),
            CircuitState::Open => {
                if inner.cooldown_elapsed(now, self.config.half_open_delay) {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::debug!(tool = %self.name, "circuit breaker half-open, admitting trial");
                    Some(BreakerPermit::new(self, true))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(BreakerPermit::new(self, true))
                }
            }
        }
    }

    /// Record a successful call that was not the half-open trial
    pub fn record_success(&self) {
        self.settle_success(false);
    }

    /// Record a failed call that was not the half-open trial (timeouts and tool errors only)
    pub fn record_failure(&self) {
        self.settle_failure(false);
    }

    /// Only the trial may close a half-open breaker; stragglers admitted while
    /// closed leave the state and window alone.
    fn settle_success(&self, trial: bool) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.failures.clear();
            }
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Closed;
                inner.failures.clear();
                inner.opened_at = None;
                inner.trial_in_flight = false;
                tracing::info!(tool = %self.name, "circuit breaker closed after successful trial");
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                tracing::debug!(tool = %self.name, state = %inner.state, "ignoring straggler success");
            }
        }
    }

    fn settle_failure(&self, trial: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        inner.prune(now, self.config.failure_window);
        inner.failures.push_back(now);

        match inner.state {
            CircuitState::Closed => {
                if inner.failures.len() >= self.config.failure_threshold as usize {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    tracing::warn!(
                        tool = %self.name,
                        failures = inner.failures.len(),
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trial_in_flight = false;
                tracing::warn!(tool = %self.name, "circuit breaker re-opened after failed trial");
            }
            CircuitState::HalfOpen => {}
            CircuitState::Open => {
                inner.opened_at = Some(now);
            }
        }
    }

    /// Release an unresolved trial without judging the tool
    fn abandon_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.state = CircuitState::Open;
            inner.trial_in_flight = false;
        }
    }

    /// Manually reset the circuit breaker
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .field("config", &self.config)
            .finish()
    }
}

/// Admission to run one call through a breaker.
///
/// Outcomes are reported through the permit so a half-open trial is resolved exactly
/// once. A trial permit dropped unresolved (cancellation, caller dropped the future)
/// leaves the breaker open with its earlier cooldown, so the next caller becomes the
/// trial immediately.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self { breaker, trial }
    }

    /// Whether this permit is the half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Report success
    pub fn record_success(&mut self) {
        self.breaker.settle_success(self.trial);
        self.trial = false;
    }

    /// Report failure
    pub fn record_failure(&mut self) {
        self.breaker.settle_failure(self.trial);
        self.trial = false;
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial {
            self.breaker.abandon_trial();
        }
    }
}
