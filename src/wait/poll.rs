//! The polling loop shared by every probing strategy.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::wait::context::WaitContext;
use crate::wait::error::{Result, WaitError};
use crate::wait::target::{Endpoint, Port, StrategyTarget};

/// Outcome of one probe attempt.
#[derive(Debug)]
pub(crate) enum Probe {
    Ready,
    /// Not ready yet, with the reason kept for the eventual timeout error.
    NotReady(String),
}

/// Probe until ready, the context's deadline passes, or it is cancelled.
///
/// `probe` receives the 1-based attempt number. It returns `Err` only for
/// failures that retrying cannot fix; those end the wait immediately.
/// Attempts never overlap: the next one starts only after the previous
/// future has completed and `interval` has elapsed.
///
/// Returns the number of attempts made.
pub(crate) async fn poll_until_ready<F, Fut>(
    ctx: &WaitContext,
    interval: Duration,
    target: &str,
    mut probe: F,
) -> Result<u32>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Probe>>,
{
    let started = Instant::now();
    let mut last_failure: Option<String> = None;
    let mut attempt = 0u32;

    let cancelled = || WaitError::Cancelled {
        target: target.to_string(),
        elapsed: started.elapsed(),
    };
    let timed_out = |last_failure: Option<String>| WaitError::Timeout {
        target: target.to_string(),
        elapsed: started.elapsed(),
        last_failure,
    };

    loop {
        if ctx.is_cancelled() {
            return Err(cancelled());
        }
        if ctx.is_expired() {
            return Err(timed_out(last_failure));
        }

        attempt += 1;

        // The in-flight probe is dropped (closing its connection) if the
        // deadline or cancellation wins the race.
        let outcome = tokio::select! {
            biased;
            _ = ctx.token().cancelled() => return Err(cancelled()),
            _ = ctx.expired() => return Err(timed_out(last_failure)),
            outcome = probe(attempt) => outcome?,
        };

        match outcome {
            Probe::Ready => {
                tracing::info!(
                    target_name = %target,
                    attempts = attempt,
                    elapsed = ?started.elapsed(),
                    "Target ready"
                );
                return Ok(attempt);
            }
            Probe::NotReady(reason) => {
                tracing::debug!(
                    target_name = %target,
                    attempt,
                    reason = %reason,
                    "Target not ready"
                );
                last_failure = Some(reason);
            }
        }

        if !ctx.pause(interval).await {
            return Err(cancelled());
        }
    }
}

/// Where a probe should go, or why it cannot go anywhere yet.
#[derive(Debug)]
pub(crate) enum Resolved {
    Endpoint(Endpoint),
    Pending(String),
}

/// Parse a configured port identifier.
pub(crate) fn parse_port(port: Option<&str>) -> Result<Option<Port>> {
    port.map(|p| p.parse::<Port>())
        .transpose()
        .map_err(|e| WaitError::config(e.to_string()))
}

/// Resolve the endpoint to probe for this attempt.
///
/// Without a configured port the target must expose exactly one; anything
/// else is a configuration error. Target query failures are transient.
pub(crate) async fn resolve_endpoint(
    port: Option<Port>,
    target: &dyn StrategyTarget,
) -> Result<Resolved> {
    let port = match port {
        Some(port) => port,
        None => match target.exposed_ports().await {
            Ok(ports) => single_port(&ports)?,
            Err(e) => return Ok(Resolved::Pending(e.to_string())),
        },
    };

    match target.resolve_address(&port).await {
        Ok(endpoint) => Ok(Resolved::Endpoint(endpoint)),
        Err(e) => Ok(Resolved::Pending(e.to_string())),
    }
}

fn single_port(ports: &[Port]) -> Result<Port> {
    match ports {
        [port] => Ok(*port),
        [] => Err(WaitError::config(
            "no port configured and the target exposes no ports",
        )),
        many => Err(WaitError::config(format!(
            "no port configured and the target exposes {} ports ({}); pick one with with_port",
            many.len(),
            many.iter()
                .map(Port::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}
