//! HTTP strategy against in-process services.
//!
//! Every test drives the real polling engine over loopback sockets; targets
//! are scripted so the number of attempts is deterministic.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use pretty_assertions::assert_eq;

use common::{FlakyTarget, SlowBindTarget, TestServer, dead_port, init_tracing};
use sidecar_wait::wait::{
    self, HeaderMap, MAX_BODY_BYTES, Method, Port, StaticTarget, TlsConfig, WaitContext, WaitError,
    WaitStrategy, body_contains, status_is,
};

const FAST: Duration = Duration::from_millis(20);

fn local(internal: u16, external: u16) -> StaticTarget {
    StaticTarget::new("127.0.0.1").with_port(Port::tcp(internal), external)
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ready_after_refused_connections() {
    init_tracing();
    let server = TestServer::pong().await;
    let target = FlakyTarget::new(3, server.port());

    wait::for_http("/")
        .with_port("3000/tcp")
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_secs(10))
        .wait_until_ready(&WaitContext::new(), &target)
        .await
        .unwrap();

    // Three refusals, then the attempt that succeeded.
    assert_eq!(target.lookups(), 4);
    assert_eq!(server.service.hits(), 1);
}

#[tokio::test]
async fn ready_on_nth_response_makes_exactly_n_requests() {
    let server = TestServer::start(5, StatusCode::OK, "ok").await;

    wait::for_http("/health")
        .with_port(3000)
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_secs(10))
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap();

    assert_eq!(server.service.hits(), 5);
}

#[tokio::test]
async fn unpublished_port_is_retried() {
    let server = TestServer::pong().await;
    let target = SlowBindTarget::new(2, server.port());

    wait::for_http("/")
        .with_port("3000/tcp")
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_secs(10))
        .wait_until_ready(&WaitContext::new(), &target)
        .await
        .unwrap();

    assert_eq!(server.service.hits(), 1);
}

#[tokio::test]
async fn single_exposed_port_is_inferred() {
    let server = TestServer::pong().await;

    wait::for_http("/")
        .with_poll_interval(FAST)
        .wait_until_ready(&WaitContext::new(), &local(8080, server.port()))
        .await
        .unwrap();

    assert_eq!(server.service.hits(), 1);
}

#[tokio::test]
async fn force_ipv4_localhost() {
    let server = TestServer::pong().await;
    let target = StaticTarget::new("localhost").with_port(Port::tcp(3000), server.port());

    wait::for_http("/")
        .with_port("3000/tcp")
        .with_force_ipv4_localhost(true)
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_secs(10))
        .wait_until_ready(&WaitContext::new(), &target)
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn body_is_replayed_on_every_attempt() {
    let server = TestServer::start(3, StatusCode::OK, "pong").await;

    wait::for_http("/ping")
        .with_port("6443/tcp")
        .with_method(Method::POST)
        .with_body("ping")
        .with_response_matcher(body_contains("pong"))
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_secs(10))
        .wait_until_ready(&WaitContext::new(), &local(6443, server.port()))
        .await
        .unwrap();

    let requests = server.service.requests();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_eq!(request.method, Method::POST);
        assert_eq!(&request.body[..], b"ping");
    }
}

#[tokio::test]
async fn headers_and_basic_auth_are_sent() {
    let server = TestServer::pong().await;

    wait::for_http("/")
        .with_port(3000)
        .with_headers([("X-Probe", "readiness")])
        .with_basic_auth("user", "pass")
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap();

    let requests = server.service.requests();
    let headers = &requests[0].headers;
    assert_eq!(headers.get("x-probe").unwrap(), "readiness");
    assert_eq!(headers.get("authorization").unwrap(), "Basic dXNlcjpwYXNz");
}

#[tokio::test]
async fn shared_strategy_waits_on_several_targets() {
    let first = TestServer::start(2, StatusCode::OK, "pong").await;
    let second = TestServer::start(3, StatusCode::OK, "pong").await;
    let strategy = Arc::new(
        wait::for_http("/")
            .with_port("3000/tcp")
            .with_poll_interval(FAST)
            .with_startup_timeout(Duration::from_secs(10)),
    );

    let ctx = WaitContext::new();
    let first_target = local(3000, first.port());
    let second_target = local(3000, second.port());
    let (a, b) = tokio::join!(
        strategy.wait_until_ready(&ctx, &first_target),
        strategy.wait_until_ready(&ctx, &second_target),
    );

    a.unwrap();
    b.unwrap();
    assert_eq!(first.service.hits(), 2);
    assert_eq!(second.service.hits(), 3);
}

// ---------------------------------------------------------------------------
// Acceptance policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_matcher_alone_accepts_404() {
    let server = TestServer::start(1, StatusCode::NOT_FOUND, "no such page").await;

    wait::for_http("/missing")
        .with_port(3000)
        .with_status_matcher(status_is(404))
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap();

    assert_eq!(server.service.hits(), 1);
}

#[tokio::test]
async fn body_mismatch_times_out() {
    init_tracing();
    let server = TestServer::start(1, StatusCode::OK, "fail").await;

    let err = wait::for_http("/")
        .with_port(3000)
        .with_response_matcher(body_contains("pong"))
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_millis(400))
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap_err();

    match err {
        WaitError::Timeout { last_failure, .. } => {
            assert!(last_failure.unwrap().contains("status 200"));
        }
        other => panic!("Expected timeout, got {other:?}"),
    }
    assert!(server.service.hits() > 1);
}

#[tokio::test]
async fn oversized_body_is_cut_off_at_limit() {
    let big = "a".repeat(3 * MAX_BODY_BYTES);
    let server = TestServer::start(1, StatusCode::OK, &big).await;

    wait::for_http("/")
        .with_port(3000)
        .with_response_matcher(|body: &[u8]| body.len() == MAX_BODY_BYTES)
        .with_startup_timeout(Duration::from_secs(10))
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap();

    assert_eq!(server.service.hits(), 1);
}

#[tokio::test]
async fn rejected_status_skips_body_matcher() {
    let server = TestServer::start(u32::MAX, StatusCode::OK, "pong").await;
    let consulted = Arc::new(AtomicBool::new(false));
    let flag = consulted.clone();

    let err = wait::for_http("/")
        .with_port(3000)
        .with_response_matcher(move |_: &[u8]| {
            flag.store(true, Ordering::SeqCst);
            true
        })
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_millis(300))
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap_err();

    match err {
        WaitError::Timeout { last_failure, .. } => {
            assert_eq!(last_failure.as_deref(), Some("status 503 was not accepted"));
        }
        other => panic!("Expected timeout, got {other:?}"),
    }
    assert!(!consulted.load(Ordering::SeqCst));
    assert!(server.service.hits() > 1);
}

#[tokio::test]
async fn headers_matcher_sees_response_headers() {
    let server = TestServer::start(2, StatusCode::OK, "ok").await;

    wait::for_http("/")
        .with_port(3000)
        // The 503 answers also carry x-ready; only the final one says yes.
        .with_status_matcher(|_| true)
        .with_response_headers_matcher(|headers: &HeaderMap| {
            headers.get("x-ready").is_some_and(|v| v == "yes")
        })
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_secs(10))
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap();

    assert_eq!(server.service.hits(), 2);
}

// ---------------------------------------------------------------------------
// Deadlines and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ambient_deadline_applies_without_startup_timeout() {
    let interval = Duration::from_millis(50);
    let ctx = WaitContext::new().with_timeout(Duration::from_millis(300));
    let started = Instant::now();

    let err = wait::for_http("/")
        .with_port(3000)
        .with_startup_timeout(Duration::ZERO)
        .with_poll_interval(interval)
        .wait_until_ready(&ctx, &local(3000, dead_port()))
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "{err}");
    assert!(started.elapsed() < Duration::from_millis(300) + interval + Duration::from_secs(1));
}

#[tokio::test]
async fn unbounded_startup_timeout_still_waits() {
    let server = TestServer::start(2, StatusCode::OK, "pong").await;

    wait::for_http("/")
        .with_port(3000)
        .with_startup_timeout(Duration::MAX)
        .with_poll_interval(FAST)
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap();

    assert_eq!(server.service.hits(), 2);
}

#[tokio::test]
async fn cancel_during_sleep_returns_promptly() {
    let server = TestServer::start(u32::MAX, StatusCode::OK, "never").await;
    let ctx = WaitContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = wait::for_http("/")
        .with_port(3000)
        .with_poll_interval(Duration::from_secs(30))
        .wait_until_ready(&ctx, &local(3000, server.port()))
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "{err}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.service.hits(), 1);
}

#[tokio::test]
async fn tls_against_plain_http_times_out() {
    let server = TestServer::pong().await;

    let err = wait::for_http("/")
        .with_port(3000)
        .with_tls(true, None)
        .with_poll_interval(FAST)
        .with_startup_timeout(Duration::from_millis(300))
        .wait_until_ready(&WaitContext::new(), &local(3000, server.port()))
        .await
        .unwrap_err();

    match err {
        WaitError::Timeout { last_failure, .. } => assert!(last_failure.is_some()),
        other => panic!("Expected timeout, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ambiguous_ports_fail_without_probing() {
    let server = TestServer::pong().await;
    let target = StaticTarget::new("127.0.0.1")
        .with_port(Port::tcp(80), server.port())
        .with_port(Port::tcp(443), server.port());

    let err = wait::for_http("/")
        .wait_until_ready(&WaitContext::new(), &target)
        .await
        .unwrap_err();

    assert!(err.is_config(), "{err}");
    assert_eq!(server.service.hits(), 0);

    let err = wait::for_http("/")
        .wait_until_ready(&WaitContext::new(), &StaticTarget::new("127.0.0.1"))
        .await
        .unwrap_err();
    assert!(err.is_config(), "{err}");
}

#[tokio::test]
async fn invalid_settings_are_config_errors() {
    let target = local(3000, dead_port());
    let ctx = WaitContext::new();

    let bad_port = wait::for_http("/").with_port("3000/http");
    assert!(
        bad_port
            .wait_until_ready(&ctx, &target)
            .await
            .unwrap_err()
            .is_config()
    );

    let bad_header = wait::for_http("/")
        .with_port(3000)
        .with_headers([("bad header", "x")]);
    assert!(
        bad_header
            .wait_until_ready(&ctx, &target)
            .await
            .unwrap_err()
            .is_config()
    );

    let mut pem = tempfile::NamedTempFile::new().unwrap();
    writeln!(pem, "-----BEGIN NOTHING-----").unwrap();
    let bad_root = wait::for_http("/").with_port(3000).with_tls(
        true,
        TlsConfig::new().with_root_certificate_file(pem.path()),
    );
    assert!(
        bad_root
            .wait_until_ready(&ctx, &target)
            .await
            .unwrap_err()
            .is_config()
    );
}
