//! Circuit breaker implementation for resilience.
//!
//! This module provides a circuit breaker pattern implementation to protect
//! services from cascading failures when downstream dependencies are unavailable.
//!
//! State transitions:
//!
//! ```text
//! Closed   -> Open:     consecutive failures reach the failure threshold
//! Open     -> HalfOpen: open timeout elapsed, checked on the next call
//! HalfOpen -> Closed:   trial quota reached with consecutive successes
//! HalfOpen -> Open:     any trial failure
//! ```
//!
//! Counts are grouped into generations. A generation ends on every state
//! transition and, in the closed state, whenever the counting interval rolls
//! over. Results reported for an older generation are ignored.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::PlatformError;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, limited requests are allowed to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase label, used for logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Requests admitted in this generation
    pub requests: u32,
    /// Successful requests in this generation
    pub total_successes: u32,
    /// Failed requests in this generation
    pub total_failures: u32,
    /// Successes since the last failure
    pub consecutive_successes: u32,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Upper bound for `open_timeout` and `interval` (100 years).
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Callback invoked with `(name, from, to)` on every state transition.
pub type StateChangeObserver = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Circuit breaker configuration.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Name reported to observers and logs
    pub name: String,
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time to wait before transitioning from open to half-open
    pub open_timeout: Duration,
    /// Maximum trial requests in half-open state; this many consecutive
    /// successes close the circuit
    pub half_open_max_requests: u32,
    /// Closed-state counting window. Zero keeps counts until the next transition.
    pub interval: Duration,
    /// Optional observer for state transitions
    pub on_state_change: Option<StateChangeObserver>,
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("open_timeout", &self.open_timeout)
            .field("half_open_max_requests", &self.half_open_max_requests)
            .field("interval", &self.interval)
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            open_timeout: Duration::from_secs(10),
            half_open_max_requests: 3,
            interval: Duration::from_secs(30),
            on_state_change: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a default config for the named circuit.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a new config with custom failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Create a new config with custom open-state timeout.
    #[must_use]
    pub const fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Create a new config with custom half-open trial quota.
    #[must_use]
    pub const fn with_half_open_max_requests(mut self, max_requests: u32) -> Self {
        self.half_open_max_requests = max_requests;
        self
    }

    /// Create a new config with custom closed-state counting interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Attach a state transition observer.
    ///
    /// The observer runs under the breaker's lock, once per transition and in
    /// transition order. It must not call back into the breaker.
    #[must_use]
    pub fn with_state_change_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(observer));
        self
    }

    /// Validate the tunables.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidInput`] when a threshold, quota or
    /// timeout is zero, or a duration exceeds [`MAX_DURATION`].
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.failure_threshold == 0 {
            return Err(PlatformError::invalid_input(
                "failure_threshold must be greater than 0",
            ));
        }
        if self.half_open_max_requests == 0 {
            return Err(PlatformError::invalid_input(
                "half_open_max_requests must be greater than 0",
            ));
        }
        if self.open_timeout.is_zero() {
            return Err(PlatformError::invalid_input(
                "open_timeout must be greater than 0",
            ));
        }
        if self.open_timeout > MAX_DURATION {
            return Err(PlatformError::invalid_input(
                "open_timeout exceeds the maximum duration",
            ));
        }
        if self.interval > MAX_DURATION {
            return Err(PlatformError::invalid_input(
                "interval exceeds the maximum duration",
            ));
        }
        Ok(())
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker refused the call without invoking the operation
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Name of the rejecting circuit
        name: String,
    },
    /// The operation ran and failed
    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Whether the breaker rejected the call.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation error, if the operation ran.
    #[must_use]
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Open { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

/// State guarded by the breaker mutex.
#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

impl Inner {
    fn new(now: Instant, config: &CircuitBreakerConfig) -> Self {
        let mut inner = Self {
            state: CircuitState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        inner.new_generation(now, config);
        inner
    }

    /// Resolve time-driven changes and return the effective state and generation.
    fn current_state(
        &mut self,
        now: Instant,
        config: &CircuitBreakerConfig,
        transitions: &mut Vec<Transition>,
    ) -> (CircuitState, u64) {
        match self.state {
            CircuitState::Closed => {
                if self.expiry.is_some_and(|expiry| now >= expiry) {
                    self.new_generation(now, config);
                }
            }
            CircuitState::Open => {
                if self.expiry.is_some_and(|expiry| now >= expiry) {
                    self.set_state(CircuitState::HalfOpen, now, config, transitions);
                }
            }
            CircuitState::HalfOpen => {}
        }
        (self.state, self.generation)
    }

    fn set_state(
        &mut self,
        to: CircuitState,
        now: Instant,
        config: &CircuitBreakerConfig,
        transitions: &mut Vec<Transition>,
    ) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.new_generation(now, config);
        transitions.push(Transition { from, to });
    }

    fn new_generation(&mut self, now: Instant, config: &CircuitBreakerConfig) {
        self.generation = self.generation.wrapping_add(1);
        self.counts.clear();
        // An expiry past the end of the clock never fires
        self.expiry = match self.state {
            CircuitState::Closed if config.interval.is_zero() => None,
            CircuitState::Closed => now.checked_add(config.interval),
            CircuitState::Open => now.checked_add(config.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn on_success(
        &mut self,
        state: CircuitState,
        now: Instant,
        config: &CircuitBreakerConfig,
        transitions: &mut Vec<Transition>,
    ) {
        match state {
            CircuitState::Closed => self.counts.on_success(),
            CircuitState::HalfOpen => {
                self.counts.on_success();
                if self.counts.consecutive_successes >= config.half_open_max_requests {
                    self.set_state(CircuitState::Closed, now, config, transitions);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(
        &mut self,
        state: CircuitState,
        now: Instant,
        config: &CircuitBreakerConfig,
        transitions: &mut Vec<Transition>,
    ) {
        match state {
            CircuitState::Closed => {
                self.counts.on_failure();
                if self.counts.consecutive_failures >= config.failure_threshold {
                    self.set_state(CircuitState::Open, now, config, transitions);
                }
            }
            CircuitState::HalfOpen => {
                self.set_state(CircuitState::Open, now, config, transitions);
            }
            CircuitState::Open => {}
        }
    }
}

/// Circuit breaker for protecting external services.
///
/// Implements the circuit breaker pattern with three states:
/// - Closed: Normal operation, requests are allowed
/// - Open: Failure threshold exceeded, requests are rejected
/// - Half-Open: Testing recovery, limited requests allowed
///
/// Admission, counting and transitions share one mutex and are applied as a
/// single step, so concurrent callers never see more half-open trials than
/// the configured quota. The lock is not held while the operation runs.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let inner = Inner::new(Instant::now(), &config);
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Returns the circuit breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the breaker configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current circuit state.
    ///
    /// An expired open timeout is applied here, so reading the state may
    /// itself move the breaker to half-open.
    pub fn state(&self) -> CircuitState {
        let mut transitions = Vec::new();
        let mut inner = self.inner.lock();
        let (state, _) = inner.current_state(Instant::now(), &self.config, &mut transitions);
        self.notify(&transitions);
        state
    }

    /// Snapshot of the counts for the current generation.
    pub fn counts(&self) -> Counts {
        self.inner.lock().counts
    }

    /// Execute an async operation with circuit breaker protection.
    ///
    /// The operation is only invoked when the breaker admits the call. If the
    /// returned future is dropped after admission, the call counts as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] when the circuit is open or the
    /// half-open trial quota is exhausted, and [`BreakerError::Operation`]
    /// when the operation itself fails.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.before_request() else {
            return Err(BreakerError::Open {
                name: self.config.name.clone(),
            });
        };

        match operation().await {
            Ok(value) => {
                admission.settle(true);
                Ok(value)
            }
            Err(err) => {
                admission.settle(false);
                Err(BreakerError::Operation(err))
            }
        }
    }

    fn before_request(&self) -> Option<Admission<'_>> {
        let mut transitions = Vec::new();
        let admitted = {
            let mut inner = self.inner.lock();
            let (state, generation) =
                inner.current_state(Instant::now(), &self.config, &mut transitions);

            let rejected = match state {
                CircuitState::Open => true,
                CircuitState::HalfOpen => {
                    inner.counts.requests >= self.config.half_open_max_requests
                }
                CircuitState::Closed => false,
            };

            self.notify(&transitions);
            if rejected {
                None
            } else {
                inner.counts.on_request();
                Some(generation)
            }
        };

        admitted.map(|generation| Admission {
            breaker: self,
            generation,
            settled: false,
        })
    }

    fn after_request(&self, before: u64, success: bool) {
        let mut transitions = Vec::new();
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let (state, generation) = inner.current_state(now, &self.config, &mut transitions);
        if generation == before {
            if success {
                inner.on_success(state, now, &self.config, &mut transitions);
            } else {
                inner.on_failure(state, now, &self.config, &mut transitions);
            }
        }
        self.notify(&transitions);
    }

    /// Report transitions. Called with the state lock held, so observers see
    /// transitions in the order they happened and must not call back into
    /// the breaker.
    fn notify(&self, transitions: &[Transition]) {
        let name = self.config.name.as_str();
        for transition in transitions {
            if transition.to == CircuitState::Open {
                warn!(
                    circuit = %name,
                    from = %transition.from,
                    to = %transition.to,
                    "Circuit breaker opened"
                );
            } else {
                info!(
                    circuit = %name,
                    from = %transition.from,
                    to = %transition.to,
                    "Circuit breaker state changed"
                );
            }
            if let Some(observer) = &self.config.on_state_change {
                observer(name, transition.from, transition.to);
            }
        }
    }
}

/// An admitted call. Dropping it unsettled records a failure.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Admission<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.after_request(self.generation, false);
        }
    }
}
