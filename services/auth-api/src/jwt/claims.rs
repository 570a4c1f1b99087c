use serde::{Deserialize, Serialize};

/// Scope granted to every users API token.
pub const READ_SCOPE: &str = "read";

/// Claims carried by the bearer token sent to the users API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserApiClaims {
    /// User the token is scoped to
    pub username: String,
    /// Granted scope, always read-only
    pub scope: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

impl UserApiClaims {
    /// Read-only claims for `username`, valid for `ttl_seconds` from now.
    pub fn read_only(username: impl Into<String>, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            username: username.into(),
            scope: READ_SCOPE.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_seconds),
        }
    }
}
