//! Circuit Breaker and Login Metrics
//!
//! Prometheus metrics for breaker state changes, fallback substitutions and
//! login outcomes.

use prometheus::{CounterVec, GaugeVec, IntCounter, Opts, Registry};
use rust_common::CircuitState;

const NAMESPACE: &str = "auth_api";

/// Final outcome of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Profile resolved and credentials accepted
    Success,
    /// Credentials rejected
    WrongCredentials,
    /// Profile resolution failed
    Error,
}

impl LoginOutcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::WrongCredentials => "wrong_credentials",
            Self::Error => "error",
        }
    }
}

/// Metrics for the login core.
#[derive(Clone)]
pub struct AuthApiMetrics {
    /// State changes counter
    pub state_changes: CounterVec,
    /// Current state gauge (0=closed, 1=open, 2=half-open)
    pub current_state: GaugeVec,
    /// Profiles served from the fallback catalog
    pub fallbacks: IntCounter,
    /// Login attempts by outcome
    pub logins: CounterVec,
}

impl AuthApiMetrics {
    /// Creates the metrics and registers them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns a [`prometheus::Error`] if a metric is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let state_changes = CounterVec::new(
            Opts::new("circuit_breaker_state_changes_total", "Total circuit breaker state changes")
                .namespace(NAMESPACE),
            &["circuit", "from_state", "to_state"],
        )?;
        registry.register(Box::new(state_changes.clone()))?;

        let current_state = GaugeVec::new(
            Opts::new("circuit_breaker_state", "Current circuit breaker state")
                .namespace(NAMESPACE),
            &["circuit"],
        )?;
        registry.register(Box::new(current_state.clone()))?;

        let fallbacks = IntCounter::with_opts(
            Opts::new("fallback_total", "Profiles served from fallback data")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(fallbacks.clone()))?;

        let logins = CounterVec::new(
            Opts::new("logins_total", "Login attempts by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(logins.clone()))?;

        Ok(Self {
            state_changes,
            current_state,
            fallbacks,
            logins,
        })
    }

    /// Records a state change
    pub fn record_state_change(&self, circuit: &str, from: CircuitState, to: CircuitState) {
        self.state_changes
            .with_label_values(&[circuit, from.as_str(), to.as_str()])
            .inc();

        let state_value = match to {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        };
        self.current_state
            .with_label_values(&[circuit])
            .set(state_value);
    }

    /// Records a fallback substitution
    pub fn record_fallback(&self) {
        self.fallbacks.inc();
    }

    /// Records a login outcome
    pub fn record_login(&self, outcome: LoginOutcome) {
        self.logins.with_label_values(&[outcome.as_str()]).inc();
    }
}

/// Breaker observer that feeds state changes into `metrics`.
pub fn breaker_state_observer(
    metrics: AuthApiMetrics,
) -> impl Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static {
    move |circuit: &str, from: CircuitState, to: CircuitState| {
        metrics.record_state_change(circuit, from, to);
    }
}
