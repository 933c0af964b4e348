//! Readiness wait strategies.
//!
//! A strategy is inert configuration plus one call,
//! [`WaitStrategy::wait_until_ready`], which polls a [`StrategyTarget`]
//! until it is ready, the effective deadline passes, or the caller cancels.
//!
//! # Deadlines
//!
//! The effective deadline is the earlier of the caller's [`WaitContext`]
//! deadline and the strategy's own startup timeout. A startup timeout of
//! zero leaves only the caller's deadline; with neither, polling continues
//! until the context is cancelled.
//!
//! # Errors
//!
//! Refused connections, TLS failures, unpublished ports and rejected
//! responses are retried silently (logged at `debug`). Only
//! [`WaitError::Config`], [`WaitError::Timeout`] and
//! [`WaitError::Cancelled`] reach the caller.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use sidecar_wait::wait::{self, StaticTarget, WaitContext, WaitStrategy};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let target = StaticTarget::localhost(3000);
//! let strategy = wait::for_http("/health")
//!     .with_port("3000/tcp")
//!     .with_startup_timeout(Duration::from_secs(30));
//!
//! strategy.wait_until_ready(&WaitContext::new(), &target).await?;
//! # Ok(())
//! # }
//! ```

mod all;
mod context;
mod error;
mod http;
mod listening;
mod matcher;
mod poll;
mod target;
mod tls;

use async_trait::async_trait;

pub use all::AllStrategy;
pub use context::WaitContext;
pub use error::{Result, WaitError};
pub use http::{HttpStrategy, MAX_BODY_BYTES};
pub use listening::ListeningPortStrategy;
pub use matcher::{
    AcceptancePolicy, HeadersMatcher, ResponseMatcher, StatusMatcher, body_contains, status_in,
    status_is,
};
pub use reqwest::Method;
pub use reqwest::header::HeaderMap;
pub use target::{Endpoint, Port, Protocol, StaticTarget, StrategyTarget, TargetError};
pub use tls::TlsConfig;
pub use tokio_util::sync::CancellationToken;

/// A readiness check against a running target.
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// Block until the target is ready.
    ///
    /// Never changes the target's state; may be called any number of times
    /// against different targets.
    async fn wait_until_ready(&self, ctx: &WaitContext, target: &dyn StrategyTarget) -> Result<()>;
}

/// HTTP strategy probing `path`.
pub fn for_http(path: impl Into<String>) -> HttpStrategy {
    HttpStrategy::new(path)
}

/// TCP connect strategy for `port` (`"5432/tcp"`, `5432`, or a [`Port`]).
pub fn for_listening_port(port: impl ToString) -> ListeningPortStrategy {
    ListeningPortStrategy::new().with_port(port)
}

/// Composite strategy that requires every member to succeed, in order.
pub fn for_all(strategies: Vec<std::sync::Arc<dyn WaitStrategy>>) -> AllStrategy {
    AllStrategy::new(strategies)
}
