//! Per-request deadline and cancellation.
//!
//! A [`RequestContext`] travels with each login. Upstream calls run under
//! [`RequestContext::run`], which aborts them as soon as the caller cancels or
//! the deadline passes, whichever comes first.

use std::future::{Future, pending};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::AuthApiError;

/// Caller-side switch that cancels every context derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated requests. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Deadline and cancellation signal for one logical request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: Option<watch::Receiver<bool>>,
}

impl RequestContext {
    /// A context with no deadline that is never cancelled.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Bound the context by `timeout` from now, keeping an earlier deadline.
    ///
    /// A timeout too large to represent leaves the context unbounded.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Bound the context by `deadline`, keeping an earlier one.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |current| current.min(deadline)));
        self
    }

    /// Attach a cancellation signal and return the handle that fires it.
    #[must_use]
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancelled = Some(rx);
        (self, CancelHandle { tx })
    }

    /// The effective deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the caller has cancelled this request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Drive `operation` until it completes, the caller cancels, or the
    /// deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthApiError::Cancelled`] or [`AuthApiError::Timeout`] when the
    /// context ends first; otherwise the operation's own result.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, AuthApiError>
    where
        F: Future<Output = Result<T, AuthApiError>>,
    {
        if self.is_cancelled() {
            return Err(AuthApiError::Cancelled);
        }
        let budget = self.remaining();
        if budget.is_some_and(|left| left.is_zero()) {
            return Err(AuthApiError::Timeout {
                duration: Duration::ZERO,
            });
        }

        let cancelled = async {
            match self.cancelled.clone() {
                Some(mut rx) => {
                    let signalled = rx.wait_for(|cancelled| *cancelled).await.is_ok();
                    if !signalled {
                        // Handle dropped without cancelling
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(AuthApiError::Cancelled),
            () = expired => Err(AuthApiError::Timeout {
                duration: budget.unwrap_or_default(),
            }),
            result = operation => result,
        }
    }
}
