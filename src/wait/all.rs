//! All-of composite strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::WaitDefaults;
use crate::wait::WaitStrategy;
use crate::wait::context::WaitContext;
use crate::wait::error::Result;
use crate::wait::target::StrategyTarget;

/// Runs each member strategy in order under one shared deadline.
///
/// Members keep their own startup timeouts, which can only shorten the
/// shared deadline for that member. The first failure ends the wait.
#[derive(Clone)]
pub struct AllStrategy {
    strategies: Vec<Arc<dyn WaitStrategy>>,
    startup_timeout: Option<Duration>,
}

impl AllStrategy {
    pub fn new(strategies: Vec<Arc<dyn WaitStrategy>>) -> Self {
        Self {
            strategies,
            startup_timeout: WaitDefaults::default().startup_timeout,
        }
    }

    /// Append a member.
    pub fn with(mut self, strategy: impl WaitStrategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Zero defers to the caller's deadline.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_defaults(mut self, defaults: &WaitDefaults) -> Self {
        self.startup_timeout = defaults.startup_timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[async_trait]
impl WaitStrategy for AllStrategy {
    async fn wait_until_ready(&self, ctx: &WaitContext, target: &dyn StrategyTarget) -> Result<()> {
        let ctx = ctx.narrowed(self.startup_timeout);

        for (index, strategy) in self.strategies.iter().enumerate() {
            tracing::debug!(member = index, total = self.len(), "Running wait strategy");
            strategy.wait_until_ready(&ctx, target).await?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for AllStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllStrategy")
            .field("members", &self.len())
            .field("startup_timeout", &self.startup_timeout)
            .finish()
    }
}
