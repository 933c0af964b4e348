//! HTTP(S) readiness strategy.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Client, ClientBuilder, Method, Response};
use url::Url;

use crate::config::WaitDefaults;
use crate::wait::WaitStrategy;
use crate::wait::context::WaitContext;
use crate::wait::error::{Result, WaitError};
use crate::wait::matcher::AcceptancePolicy;
use crate::wait::poll::{Probe, Resolved, parse_port, poll_until_ready, resolve_endpoint};
use crate::wait::target::{Endpoint, Port, StrategyTarget};
use crate::wait::tls::TlsConfig;

/// Response bodies longer than this are cut off before the body matcher
/// sees them.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Waits until an HTTP endpoint on the target answers with an accepted
/// response.
///
/// ```no_run
/// # use std::time::Duration;
/// # use sidecar_wait::wait::{self, Method, TlsConfig};
/// let strategy = wait::for_http("/ping")
///     .with_port("6443/tcp")
///     .with_tls(true, TlsConfig::new().with_server_name("testcontainer.go.test"))
///     .with_method(Method::POST)
///     .with_body("ping")
///     .with_response_matcher(wait::body_contains("pong"))
///     .with_startup_timeout(Duration::from_secs(10));
/// ```
#[derive(Clone)]
pub struct HttpStrategy {
    port: Option<String>,
    path: String,
    method: Method,
    body: Option<Bytes>,
    headers: Vec<(String, String)>,
    basic_auth: Option<(String, String)>,
    use_tls: bool,
    tls_config: Option<TlsConfig>,
    allow_insecure: bool,
    policy: AcceptancePolicy,
    poll_interval: Duration,
    startup_timeout: Option<Duration>,
    force_ipv4_localhost: bool,
}

impl HttpStrategy {
    /// Probe `path` with `GET`, accepting status 200.
    pub fn new(path: impl Into<String>) -> Self {
        let defaults = WaitDefaults::default();
        Self {
            port: None,
            path: path.into(),
            method: Method::GET,
            body: None,
            headers: Vec::new(),
            basic_auth: None,
            use_tls: false,
            tls_config: None,
            allow_insecure: false,
            policy: AcceptancePolicy::default(),
            poll_interval: defaults.poll_interval,
            startup_timeout: defaults.startup_timeout,
            force_ipv4_localhost: false,
        }
    }

    /// Internal port to probe: `"3000/tcp"`, `"3000"`, `3000` or a [`Port`].
    ///
    /// Without one, the target must expose exactly one port.
    pub fn with_port(mut self, port: impl ToString) -> Self {
        self.port = Some(port.to_string());
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Request body, sent in full on every attempt.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Replace the extra request headers.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    /// Switch to HTTPS. `config` is only consulted when `use_tls` is true.
    pub fn with_tls(mut self, use_tls: bool, config: impl Into<Option<TlsConfig>>) -> Self {
        self.use_tls = use_tls;
        self.tls_config = config.into();
        self
    }

    /// Accept any server certificate. Implies TLS.
    pub fn with_allow_insecure(mut self, allow_insecure: bool) -> Self {
        self.allow_insecure = allow_insecure;
        if allow_insecure {
            self.use_tls = true;
        }
        self
    }

    /// Upper bound on the whole wait. Zero defers to the caller's deadline.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Replace the status predicate (default: `== 200`).
    pub fn with_status_matcher<F>(mut self, matcher: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.policy.set_status(matcher);
        self
    }

    /// Require the response body to satisfy `matcher`.
    pub fn with_response_matcher<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.policy.set_body(matcher);
        self
    }

    /// Require the response headers to satisfy `matcher`.
    pub fn with_response_headers_matcher<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&HeaderMap) -> bool + Send + Sync + 'static,
    {
        self.policy.set_headers(matcher);
        self
    }

    /// Dial `127.0.0.1` when the target resolves to `localhost`, for hosts
    /// where `localhost` prefers an IPv6 address nothing listens on.
    pub fn with_force_ipv4_localhost(mut self, force: bool) -> Self {
        self.force_ipv4_localhost = force;
        self
    }

    /// Take timing from resolved defaults.
    pub fn with_defaults(mut self, defaults: &WaitDefaults) -> Self {
        self.startup_timeout = defaults.startup_timeout;
        self.poll_interval = defaults.poll_interval;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn uses_tls(&self) -> bool {
        self.use_tls
    }

    fn scheme(&self) -> &'static str {
        if self.use_tls { "https" } else { "http" }
    }

    fn tls(&self) -> Option<&TlsConfig> {
        self.tls_config.as_ref().filter(|_| self.use_tls)
    }

    fn server_name(&self) -> Option<&str> {
        self.tls().and_then(TlsConfig::server_name)
    }

    fn describe(&self) -> String {
        match &self.port {
            Some(port) => format!("{} {} on port {}", self.method, self.path, port),
            None => format!("{} {}", self.method, self.path),
        }
    }

    fn request_headers(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WaitError::config(format!("invalid header name '{name}': {e}")))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                WaitError::config(format!("invalid value for header '{name}': {e}"))
            })?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }

    fn url(&self, authority: &str) -> Result<Url> {
        let raw = if self.path.starts_with('/') {
            format!("{}://{}{}", self.scheme(), authority, self.path)
        } else {
            format!("{}://{}/{}", self.scheme(), authority, self.path)
        };
        Url::parse(&raw).map_err(|e| WaitError::config(format!("invalid probe URL '{raw}': {e}")))
    }

    async fn probe(
        &self,
        attempt: u32,
        ctx: &WaitContext,
        transport: &Transport,
        headers: &HeaderMap,
        port: Option<Port>,
        target: &dyn StrategyTarget,
    ) -> Result<Probe> {
        let mut endpoint = match resolve_endpoint(port, target).await? {
            Resolved::Endpoint(endpoint) => endpoint,
            Resolved::Pending(reason) => return Ok(Probe::NotReady(reason)),
        };
        if self.force_ipv4_localhost && endpoint.host == "localhost" {
            endpoint.host = "127.0.0.1".to_string();
        }

        // With a TLS server name the URL must carry that name so SNI and
        // certificate verification use it; the connection is pinned to the
        // resolved address instead.
        let (client, authority) = match self.server_name() {
            Some(name) => {
                let addr = match lookup(&endpoint).await {
                    Ok(addr) => addr,
                    Err(reason) => return Ok(Probe::NotReady(reason)),
                };
                let client = transport.build(transport.builder().resolve(name, addr))?;
                (client, Endpoint::new(name, endpoint.port).authority())
            }
            None => (transport.client.clone(), endpoint.authority()),
        };
        let url = self.url(&authority)?;

        let mut request = client
            .request(self.method.clone(), url)
            .headers(headers.clone());
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }
        if let Some(remaining) = ctx.remaining() {
            request = request.timeout(remaining);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = error_chain(&e);
                tracing::trace!(attempt, endpoint = %endpoint, error = %reason, "Probe request failed");
                return Ok(Probe::NotReady(reason));
            }
        };

        let status = response.status().as_u16();
        if !self.policy.accepts_status(status) {
            // Dropped unread; the connection is closed rather than drained.
            return Ok(Probe::NotReady(format!("status {status} was not accepted")));
        }

        let response_headers = response.headers().clone();
        let body = match read_body(response).await {
            Ok(body) => body,
            Err(e) => {
                return Ok(Probe::NotReady(format!(
                    "failed to read response body: {}",
                    error_chain(&e)
                )));
            }
        };

        if self.policy.accept(status, &response_headers, &body) {
            Ok(Probe::Ready)
        } else {
            Ok(Probe::NotReady(format!(
                "status {status} with {} byte body was not accepted",
                body.len()
            )))
        }
    }
}

#[async_trait]
impl WaitStrategy for HttpStrategy {
    async fn wait_until_ready(&self, ctx: &WaitContext, target: &dyn StrategyTarget) -> Result<()> {
        let port = parse_port(self.port.as_deref())?;
        let headers = self.request_headers()?;
        let transport = Transport::new(self)?;
        let ctx = ctx.narrowed(self.startup_timeout);
        let label = self.describe();

        tracing::debug!(
            target_name = %label,
            tls = self.use_tls,
            server_name = ?self.server_name(),
            custom_roots = self.tls().is_some_and(TlsConfig::has_custom_roots),
            body_matcher = self.policy.has_body_matcher(),
            deadline = ?ctx.remaining(),
            "Waiting for HTTP readiness"
        );

        let ctx_ref = &ctx;
        let transport = &transport;
        let headers = &headers;
        poll_until_ready(&ctx, self.poll_interval, &label, move |attempt| {
            self.probe(attempt, ctx_ref, transport, headers, port, target)
        })
        .await?;

        Ok(())
    }
}

impl fmt::Debug for HttpStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStrategy")
            .field("port", &self.port)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("headers", &self.headers)
            .field(
                "basic_auth",
                &self
                    .basic_auth
                    .as_ref()
                    .map(|(user, _)| format!("{user}:[REDACTED]")),
            )
            .field("use_tls", &self.use_tls)
            .field("tls_config", &self.tls_config)
            .field("allow_insecure", &self.allow_insecure)
            .field("policy", &self.policy)
            .field("poll_interval", &self.poll_interval)
            .field("startup_timeout", &self.startup_timeout)
            .field("force_ipv4_localhost", &self.force_ipv4_localhost)
            .finish()
    }
}

/// Client settings for one wait.
///
/// The shared client serves every attempt unless a TLS server name forces
/// a per-attempt client pinned to the freshly resolved address.
struct Transport {
    client: Client,
    roots: Vec<Certificate>,
    allow_insecure: bool,
}

impl Transport {
    fn new(strategy: &HttpStrategy) -> Result<Self> {
        let roots = match strategy.tls() {
            Some(tls) => tls.load_roots()?,
            None => Vec::new(),
        };
        let client = client_builder(&roots, strategy.allow_insecure)
            .build()
            .map_err(build_error)?;
        Ok(Self {
            client,
            roots,
            allow_insecure: strategy.allow_insecure,
        })
    }

    fn builder(&self) -> ClientBuilder {
        client_builder(&self.roots, self.allow_insecure)
    }

    fn build(&self, builder: ClientBuilder) -> Result<Client> {
        builder.build().map_err(build_error)
    }
}

fn client_builder(roots: &[Certificate], allow_insecure: bool) -> ClientBuilder {
    let mut builder = Client::builder().no_proxy();
    if !roots.is_empty() {
        builder = builder.tls_built_in_root_certs(false);
        for root in roots {
            builder = builder.add_root_certificate(root.clone());
        }
    }
    if allow_insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
}

/// Read at most [`MAX_BODY_BYTES`] of the body. Anything past the limit is
/// discarded with the connection.
async fn read_body(mut response: Response) -> reqwest::Result<BytesMut> {
    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        let room = MAX_BODY_BYTES - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn build_error(e: reqwest::Error) -> WaitError {
    WaitError::config(format!("failed to build HTTP client: {}", error_chain(&e)))
}

async fn lookup(endpoint: &Endpoint) -> std::result::Result<SocketAddr, String> {
    let mut addrs = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| format!("failed to resolve {endpoint}: {e}"))?;
    addrs
        .next()
        .ok_or_else(|| format!("no addresses found for {endpoint}"))
}

/// Flatten an error and its sources; reqwest hides the useful part
/// ("connection refused", certificate errors) in the chain.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
