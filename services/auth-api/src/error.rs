//! Error handling module with type-safe, non-exhaustive error types
//!
//! Only the open-circuit condition is recovered inside the service (by
//! substituting fallback data). Every other variant reaches the caller
//! unchanged, and the HTTP layer maps it through [`ErrorCode`].

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Non-exhaustive error enum for forward compatibility
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AuthApiError {
    /// The breaker refused the upstream call
    #[error("Circuit breaker open for service: {service}")]
    CircuitOpen {
        /// Name of the service with open circuit
        service: String,
    },

    /// The users API answered with a non-2xx status
    #[error("could not get user data ({status}): {body}")]
    UpstreamRejected {
        /// HTTP status returned upstream
        status: u16,
        /// Response body, kept as detail
        body: String,
    },

    /// The users API answered 2xx with a body that is not a user record
    #[error("Malformed users API response: {reason}")]
    MalformedResponse {
        /// Decoder message
        reason: String,
    },

    /// The submitted username/secret pair is not allowed
    #[error("wrong username or password for {username}")]
    WrongCredentials {
        /// Username that failed the check
        username: String,
    },

    /// Network-level failure talking to the users API
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of the failure
        reason: String,
    },

    /// The request or the caller's deadline expired
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// Budget that was exhausted
        duration: Duration,
    },

    /// The caller cancelled the request
    #[error("Request cancelled by caller")]
    Cancelled,

    /// Bearer token for the users API could not be issued
    #[error("Token issuance failed: {reason}")]
    TokenIssuance {
        /// Description of the signing failure
        reason: String,
    },

    /// Internal error
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    CircuitOpen,
    UpstreamRejected,
    MalformedResponse,
    WrongCredentials,
    ServiceUnavailable,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::UpstreamRejected => "UPSTREAM_REJECTED",
            Self::MalformedResponse => "UPSTREAM_MALFORMED_RESPONSE",
            Self::WrongCredentials => "AUTH_WRONG_CREDENTIALS",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the login handler should answer with
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::WrongCredentials => StatusCode::UNAUTHORIZED,
            Self::CircuitOpen | Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamRejected | Self::MalformedResponse => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            // Client closed request; no named constant exists for 499
            Self::Cancelled => match StatusCode::from_u16(499) {
                Ok(code) => code,
                Err(_) => StatusCode::BAD_REQUEST,
            },
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl AuthApiError {
    /// Get the error code for this error
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            Self::UpstreamRejected { .. } => ErrorCode::UpstreamRejected,
            Self::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            Self::WrongCredentials { .. } => ErrorCode::WrongCredentials,
            Self::Transport { .. } => ErrorCode::ServiceUnavailable,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::TokenIssuance { .. } | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } | Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::UpstreamRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this is the breaker's open-circuit refusal
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

// ============================================================================
// From trait implementations for automatic error conversion
// ============================================================================

impl From<reqwest::Error> for AuthApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse {
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                reason: err.to_string(),
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::TokenIssuance {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let err = AuthApiError::WrongCredentials {
            username: "admin".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::WrongCredentials);
        assert_eq!(err.code().http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code().as_str(), "AUTH_WRONG_CREDENTIALS");

        let err = AuthApiError::UpstreamRejected {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.code().http_status(), StatusCode::BAD_GATEWAY);

        assert_eq!(AuthApiError::Cancelled.code().http_status().as_u16(), 499);
    }

    #[test]
    fn test_retryability() {
        assert!(AuthApiError::Timeout { duration: Duration::from_secs(10) }.is_retryable());
        assert!(
            AuthApiError::UpstreamRejected { status: 503, body: String::new() }.is_retryable()
        );
        assert!(
            !AuthApiError::UpstreamRejected { status: 404, body: String::new() }.is_retryable()
        );
        assert!(!AuthApiError::WrongCredentials { username: "x".to_string() }.is_retryable());
        assert!(!AuthApiError::Cancelled.is_retryable());
    }

    #[test]
    fn test_upstream_rejected_display_carries_body() {
        let err = AuthApiError::UpstreamRejected {
            status: 500,
            body: "database down".to_string(),
        };
        assert_eq!(err.to_string(), "could not get user data (500): database down");
    }

    #[test]
    fn test_wrong_credentials_display_omits_secret() {
        let err = AuthApiError::WrongCredentials {
            username: "admin".to_string(),
        };
        assert_eq!(err.to_string(), "wrong username or password for admin");
    }
}
