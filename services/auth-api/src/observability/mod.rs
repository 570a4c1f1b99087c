//! Logging and Prometheus metrics for the login core.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{AuthApiMetrics, LoginOutcome, breaker_state_observer};
