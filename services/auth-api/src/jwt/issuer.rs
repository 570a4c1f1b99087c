//! Token issuer trait and HMAC implementation.

use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use secrecy::{ExposeSecret, SecretString};

use super::claims::UserApiClaims;
use crate::error::AuthApiError;

/// Issues short-lived bearer tokens scoped to a single user.
pub trait TokenIssuer: Send + Sync {
    /// Issue a read-only token for `username`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthApiError::TokenIssuance`] when signing fails.
    fn issue(&self, username: &str) -> Result<String, AuthApiError>;
}

/// HS256 issuer sharing a secret with the users API.
#[derive(Debug, Clone)]
pub struct HmacTokenIssuer {
    secret: SecretString,
    ttl: Duration,
}

impl HmacTokenIssuer {
    /// Creates an issuer signing with `secret`, tokens valid for `ttl`.
    #[must_use]
    pub const fn new(secret: SecretString, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl TokenIssuer for HmacTokenIssuer {
    fn issue(&self, username: &str) -> Result<String, AuthApiError> {
        let ttl = i64::try_from(self.ttl.as_secs()).map_err(|_| AuthApiError::TokenIssuance {
            reason: "token ttl out of range".to_string(),
        })?;
        let claims = UserApiClaims::read_only(username, ttl);
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
    }
}
