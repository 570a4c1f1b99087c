//! Auth API - resilient login against a remote users API.
//!
//! Profiles are fetched from the users API behind a circuit breaker. While
//! the circuit is open, a fixed fallback catalog answers instead, and login
//! checks each submitted pair against a known credential set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod fallback;
pub mod jwt;
pub mod observability;
pub mod service;
pub mod upstream;
pub mod user;

pub use config::{Config, ConfigError};
pub use context::{CancelHandle, RequestContext};
pub use credentials::{AllowedCredentialSet, CredentialKey, CredentialVerifier};
pub use error::{AuthApiError, ErrorCode};
pub use fallback::FallbackCatalog;
pub use jwt::{HmacTokenIssuer, TokenIssuer, UserApiClaims};
pub use observability::{AuthApiMetrics, LoginOutcome, init_logging};
pub use service::UserResolutionService;
pub use upstream::{UpstreamUserClient, UserDirectory};
pub use user::User;
