//! Ambient cancellation and deadline for a wait.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Caller-supplied cancellation signal and optional deadline.
///
/// Cloning is cheap and clones share the same token, so a test can keep one
/// copy to cancel while a strategy waits on another.
#[derive(Debug, Clone, Default)]
pub struct WaitContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Add a deadline. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Add a deadline `timeout` from now. A timeout too large to represent
    /// adds no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Narrow this context by a strategy's own startup timeout.
    ///
    /// `None` and zero leave the ambient deadline untouched.
    pub fn narrowed(&self, startup_timeout: Option<Duration>) -> Self {
        match startup_timeout.filter(|t| !t.is_zero()) {
            Some(timeout) => self.clone().with_timeout(timeout),
            None => self.clone(),
        }
    }

    /// The cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel every wait sharing this context's token.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves when the deadline passes; never resolves without one.
    pub(crate) async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Sleep for `interval`, cut short by the deadline or cancellation.
    ///
    /// Returns `false` if cancellation interrupted the sleep.
    pub(crate) async fn pause(&self, interval: Duration) -> bool {
        let mut wake = Instant::now() + interval;
        if let Some(deadline) = self.deadline {
            wake = wake.min(deadline);
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep_until(wake) => true,
        }
    }
}
