//! Structured logging setup.

use rust_common::{PlatformError, init_tracing};

use crate::config::Config;

/// Install the global tracing subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `LOG_LEVEL` when set.
///
/// # Errors
///
/// Returns [`PlatformError::Tracing`] if a global subscriber is already installed.
pub fn init_logging(config: &Config) -> Result<(), PlatformError> {
    init_tracing(&config.tracing_config())
}
