//! Users API client.
//!
//! One `GET {base}/users/{username}` per call, authenticated with a fresh
//! read-only bearer token. There are no retries here; repeated failures are
//! the circuit breaker's concern.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use rust_common::build_http_client;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::AuthApiError;
use crate::jwt::{HmacTokenIssuer, TokenIssuer};
use crate::user::User;

/// Source of user profiles.
pub trait UserDirectory: Send + Sync {
    /// Fetch the profile for `username`, bounded by `ctx`.
    fn fetch(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> impl Future<Output = Result<User, AuthApiError>> + Send;
}

/// HTTP client for the users API.
#[derive(Debug, Clone)]
pub struct UpstreamUserClient<I = HmacTokenIssuer> {
    client: Client,
    base_url: Url,
    issuer: I,
    request_timeout: Duration,
}

impl UpstreamUserClient<HmacTokenIssuer> {
    /// Build the client from service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthApiError::Internal`] if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, AuthApiError> {
        let client = build_http_client(&config.http_config())
            .map_err(|e| AuthApiError::Internal(e.into()))?;
        Ok(Self::new(
            client,
            config.user_api_address.clone(),
            config.token_issuer(),
            config.request_timeout(),
        ))
    }
}

impl<I: TokenIssuer> UpstreamUserClient<I> {
    /// Creates a client over an existing `reqwest` client.
    ///
    /// `request_timeout` should match the timeout the `reqwest` client was
    /// built with; it is reported on timeout errors.
    pub const fn new(client: Client, base_url: Url, issuer: I, request_timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            issuer,
            request_timeout,
        }
    }

    /// Base address of the users API.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Profile URL for `username`, with the username as one encoded segment.
    ///
    /// # Errors
    ///
    /// Returns [`AuthApiError::Internal`] if the base address cannot carry a path.
    pub fn user_url(&self, username: &str) -> Result<Url, AuthApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                AuthApiError::Internal(anyhow::anyhow!(
                    "users API address cannot be a base: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push("users")
            .push(username);
        Ok(url)
    }

    async fn get_user(&self, username: &str) -> Result<User, AuthApiError> {
        let token = self.issuer.issue(username)?;
        let url = self.user_url(username)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            debug!(username = %username, status = status.as_u16(), "Users API rejected request");
            return Err(AuthApiError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthApiError::MalformedResponse {
            reason: e.to_string(),
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> AuthApiError {
        if err.is_timeout() {
            AuthApiError::Timeout {
                duration: self.request_timeout,
            }
        } else {
            err.into()
        }
    }
}

impl<I: TokenIssuer> UserDirectory for UpstreamUserClient<I> {
    async fn fetch(&self, ctx: &RequestContext, username: &str) -> Result<User, AuthApiError> {
        debug!(username = %username, base = %self.base_url, "Fetching user from users API");
        ctx.run(self.get_user(username)).await
    }
}
