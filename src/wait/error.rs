//! Error types for wait strategies.

use std::time::Duration;

use thiserror::Error;

/// Result type for wait operations.
pub type Result<T> = std::result::Result<T, WaitError>;

/// Terminal outcomes of a wait that did not end in readiness.
///
/// Transient probe failures (refused connections, TLS handshake errors,
/// rejected responses) never appear here; they are retried inside the
/// polling loop until one of these is reached.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The strategy cannot run against this target as configured.
    #[error("Wait strategy configuration error: {reason}")]
    Config {
        /// Reason for error.
        reason: String,
    },

    /// The effective deadline elapsed before the target was ready.
    #[error(
        "Timed out after {elapsed:?} waiting for {target}: {}",
        .last_failure.as_deref().unwrap_or("no probe completed")
    )]
    Timeout {
        /// What was being waited on.
        target: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// The most recent transient failure, if any attempt completed.
        last_failure: Option<String>,
    },

    /// The caller cancelled the wait.
    #[error("Wait for {target} cancelled after {elapsed:?}")]
    Cancelled {
        /// What was being waited on.
        target: String,
        /// Time spent waiting.
        elapsed: Duration,
    },
}

impl WaitError {
    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Whether the wait gave up because its deadline passed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the caller aborted the wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the strategy was misconfigured for this target.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
