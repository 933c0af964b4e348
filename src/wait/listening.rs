//! TCP listening-port strategy.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::WaitDefaults;
use crate::wait::WaitStrategy;
use crate::wait::context::WaitContext;
use crate::wait::error::Result;
use crate::wait::poll::{Probe, Resolved, parse_port, poll_until_ready, resolve_endpoint};
use crate::wait::target::{Port, StrategyTarget};

/// Waits until a TCP connection to the target port succeeds.
#[derive(Debug, Clone)]
pub struct ListeningPortStrategy {
    port: Option<String>,
    poll_interval: Duration,
    startup_timeout: Option<Duration>,
}

impl Default for ListeningPortStrategy {
    fn default() -> Self {
        let defaults = WaitDefaults::default();
        Self {
            port: None,
            poll_interval: defaults.poll_interval,
            startup_timeout: defaults.startup_timeout,
        }
    }
}

impl ListeningPortStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Internal port to connect to. Without one, the target must expose
    /// exactly one port.
    pub fn with_port(mut self, port: impl ToString) -> Self {
        self.port = Some(port.to_string());
        self
    }

    /// Zero defers to the caller's deadline.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_defaults(mut self, defaults: &WaitDefaults) -> Self {
        self.startup_timeout = defaults.startup_timeout;
        self.poll_interval = defaults.poll_interval;
        self
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout
    }
}

#[async_trait]
impl WaitStrategy for ListeningPortStrategy {
    async fn wait_until_ready(&self, ctx: &WaitContext, target: &dyn StrategyTarget) -> Result<()> {
        let port = parse_port(self.port.as_deref())?;
        let ctx = ctx.narrowed(self.startup_timeout);
        let label = match &self.port {
            Some(port) => format!("listening port {port}"),
            None => "listening port".to_string(),
        };

        poll_until_ready(&ctx, self.poll_interval, &label, move |_| {
            probe(port, target)
        })
        .await?;

        Ok(())
    }
}

async fn probe(port: Option<Port>, target: &dyn StrategyTarget) -> Result<Probe> {
    let endpoint = match resolve_endpoint(port, target).await? {
        Resolved::Endpoint(endpoint) => endpoint,
        Resolved::Pending(reason) => return Ok(Probe::NotReady(reason)),
    };

    match TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await {
        Ok(_) => Ok(Probe::Ready),
        Err(e) => Ok(Probe::NotReady(format!(
            "connect to {endpoint} failed: {e}"
        ))),
    }
}
