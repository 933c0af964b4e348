//! Shared fixtures: an in-process HTTP service and scripted targets.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use tokio::task::JoinHandle;

use sidecar_wait::wait::{Endpoint, Port, StrategyTarget, TargetError};

/// Route strategy logs to the test output; `RUST_LOG=sidecar_wait=debug`
/// shows every rejected attempt.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Scripted HTTP service
// ---------------------------------------------------------------------------

/// A request as the service saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Answers 503 until `ready_after` requests have been seen, then
/// `status` with `body` and an `x-ready: yes` header.
pub struct Service {
    ready_after: u32,
    status: StatusCode,
    body: String,
    hits: AtomicU32,
    requests: Mutex<Vec<Recorded>>,
}

impl Service {
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle(
    State(service): State<Arc<Service>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    let hit = service.hits.fetch_add(1, Ordering::SeqCst) + 1;
    service.requests.lock().unwrap().push(Recorded {
        method,
        headers,
        body,
    });

    if hit < service.ready_after {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            [("x-ready", "no")],
            "starting".to_string(),
        )
    } else {
        (service.status, [("x-ready", "yes")], service.body.clone())
    }
}

/// A running [`Service`] on `127.0.0.1`. Stops when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    pub service: Arc<Service>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Ready from the first request with `200 pong`.
    pub async fn pong() -> Self {
        Self::start(1, StatusCode::OK, "pong").await
    }

    /// Ready on request number `ready_after` (1-based).
    pub async fn start(ready_after: u32, status: StatusCode, body: &str) -> Self {
        let service = Arc::new(Service {
            ready_after,
            status,
            body: body.to_string(),
            hits: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(service.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            service,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A local port with nothing listening on it.
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ---------------------------------------------------------------------------
// Scripted targets
// ---------------------------------------------------------------------------

/// Resolves to a refusing port for the first `refusals` lookups, then to
/// the live port.
pub struct FlakyTarget {
    refusals: u32,
    dead: u16,
    live: u16,
    lookups: AtomicU32,
}

impl FlakyTarget {
    pub fn new(refusals: u32, live: u16) -> Self {
        Self {
            refusals,
            dead: dead_port(),
            live,
            lookups: AtomicU32::new(0),
        }
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StrategyTarget for FlakyTarget {
    async fn resolve_address(&self, _port: &Port) -> Result<Endpoint, TargetError> {
        let lookup = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
        let port = if lookup <= self.refusals {
            self.dead
        } else {
            self.live
        };
        Ok(Endpoint::new("127.0.0.1", port))
    }

    async fn exposed_ports(&self) -> Result<Vec<Port>, TargetError> {
        Ok(vec![Port::tcp(3000)])
    }
}

/// Reports the port as unpublished for the first `pending` lookups.
pub struct SlowBindTarget {
    pending: u32,
    live: u16,
    lookups: AtomicU32,
}

impl SlowBindTarget {
    pub fn new(pending: u32, live: u16) -> Self {
        Self {
            pending,
            live,
            lookups: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StrategyTarget for SlowBindTarget {
    async fn resolve_address(&self, port: &Port) -> Result<Endpoint, TargetError> {
        let lookup = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
        if lookup <= self.pending {
            return Err(TargetError::NotBound { port: *port });
        }
        Ok(Endpoint::new("127.0.0.1", self.live))
    }

    async fn exposed_ports(&self) -> Result<Vec<Port>, TargetError> {
        Ok(vec![Port::tcp(3000)])
    }
}
