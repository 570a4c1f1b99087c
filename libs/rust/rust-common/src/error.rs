//! Centralized error types for all Rust libraries.
//!
//! This module provides a unified error type for the shared building blocks
//! (HTTP client construction, tracing setup, breaker configuration), with
//! built-in retryability classification.

use thiserror::Error;

/// Common error type for platform operations.
///
/// All errors are classified as either retryable or non-retryable,
/// which helps callers decide whether to retry failed operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP client could not be built or a request failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid input or configuration provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Global tracing subscriber could not be installed
    #[error("Tracing initialization failed: {0}")]
    Tracing(String),
}

impl PlatformError {
    /// Check if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// let err = PlatformError::invalid_input("threshold must be > 0");
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::InvalidInput(_) | Self::Tracing(_) => false,
        }
    }

    /// Create an invalid input error with the given message.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
