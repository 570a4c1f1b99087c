//! Profile resolution and login.
//!
//! Upstream lookups go through the circuit breaker. When the breaker refuses
//! the call the profile comes from the fallback catalog instead and no error
//! is reported. Every other failure reaches the caller unchanged.

use rust_common::{BreakerError, CircuitBreaker};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::RequestContext;
use crate::credentials::CredentialVerifier;
use crate::error::AuthApiError;
use crate::fallback::FallbackCatalog;
use crate::observability::{AuthApiMetrics, LoginOutcome, breaker_state_observer};
use crate::upstream::{UpstreamUserClient, UserDirectory};
use crate::user::User;

/// Resolves usernames to profiles and checks login credentials.
pub struct UserResolutionService<D> {
    directory: D,
    breaker: CircuitBreaker,
    fallback: FallbackCatalog,
    verifier: CredentialVerifier,
    metrics: Option<AuthApiMetrics>,
}

impl UserResolutionService<UpstreamUserClient> {
    /// Wire the service against the users API described by `config`.
    ///
    /// When `metrics` is given, breaker transitions, fallbacks and login
    /// outcomes are recorded in it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthApiError::Internal`] for invalid breaker settings or if
    /// the HTTP client cannot be built.
    pub fn from_config(
        config: &Config,
        metrics: Option<AuthApiMetrics>,
    ) -> Result<Self, AuthApiError> {
        let mut breaker_config = config.circuit_breaker_config();
        if let Some(metrics) = &metrics {
            breaker_config =
                breaker_config.with_state_change_observer(breaker_state_observer(metrics.clone()));
        }
        breaker_config
            .validate()
            .map_err(|e| AuthApiError::Internal(e.into()))?;

        let directory = UpstreamUserClient::from_config(config)?;
        let service = Self::new(directory, CircuitBreaker::new(breaker_config));
        Ok(match metrics {
            Some(metrics) => service.with_metrics(metrics),
            None => service,
        })
    }
}

impl<D: UserDirectory> UserResolutionService<D> {
    /// Service over `directory` with the built-in fallback catalog and
    /// credential set.
    pub fn new(directory: D, breaker: CircuitBreaker) -> Self {
        Self {
            directory,
            breaker,
            fallback: FallbackCatalog::builtin().clone(),
            verifier: CredentialVerifier::default(),
            metrics: None,
        }
    }

    /// Replace the fallback catalog.
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackCatalog) -> Self {
        self.fallback = fallback;
        self
    }

    /// Replace the credential verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: CredentialVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Record fallbacks and login outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: AuthApiMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The breaker guarding the directory.
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The wrapped directory.
    pub const fn directory(&self) -> &D {
        &self.directory
    }

    /// Resolve `username` to a profile.
    ///
    /// While the circuit is open the fallback profile is returned instead,
    /// without contacting the directory.
    ///
    /// # Errors
    ///
    /// Returns the directory's error when an admitted call fails.
    pub async fn resolve_user(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> Result<User, AuthApiError> {
        let result = self
            .breaker
            .execute(|| self.directory.fetch(ctx, username))
            .await
            .map_err(|err| match err {
                BreakerError::Open { name } => AuthApiError::CircuitOpen { service: name },
                BreakerError::Operation(err) => err,
            });

        match result {
            Err(err) if err.is_circuit_open() => {
                warn!(
                    circuit = %self.breaker.name(),
                    username = %username,
                    "Circuit open, serving fallback profile"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_fallback();
                }
                Ok(self.fallback.lookup(username))
            }
            other => other,
        }
    }

    /// Resolve `username` and check `secret` against the allowed pairs.
    ///
    /// The secret is never logged.
    ///
    /// # Errors
    ///
    /// Returns [`AuthApiError::WrongCredentials`] when the pair is not
    /// allowed, or the resolution error when the profile cannot be obtained.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        username: &str,
        secret: &str,
    ) -> Result<User, AuthApiError> {
        let result = self.authenticate(ctx, username, secret).await;

        let outcome = match &result {
            Ok(user) => {
                info!(
                    username = %user.username,
                    role = %user.role,
                    admin = user.is_admin(),
                    "Login succeeded"
                );
                LoginOutcome::Success
            }
            Err(AuthApiError::WrongCredentials { .. }) => {
                info!(username = %username, "Login rejected: wrong credentials");
                LoginOutcome::WrongCredentials
            }
            Err(err) => {
                warn!(username = %username, error = %err, code = err.code().as_str(), "Login failed");
                LoginOutcome::Error
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_login(outcome);
        }

        result
    }

    async fn authenticate(
        &self,
        ctx: &RequestContext,
        username: &str,
        secret: &str,
    ) -> Result<User, AuthApiError> {
        let user = self.resolve_user(ctx, username).await?;
        debug!(username = %username, "Profile resolved, checking credentials");

        if !self.verifier.verify(username, secret) {
            return Err(AuthApiError::WrongCredentials {
                username: username.to_string(),
            });
        }
        Ok(user)
    }
}
