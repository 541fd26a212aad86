mod common;

use std::time::Duration;

use common::{client, client_with, FakeDaemon, FakeTransport, Reply};
use tokio_test::{assert_err, assert_ok};
use tor_http_client::{
    Config, FailureKind, Method, RequestOutcome, RequestSpec, RetryPolicy, TorClientError,
};

fn no_delay(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO)
}

#[tokio::test]
async fn test_succeeds_on_third_attempt() {
    let transport = FakeTransport::script(vec![
        Reply::Refused,
        Reply::Status(502),
        Reply::Status(200),
    ]);
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let outcome = assert_ok!(
        client
            .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(3))
            .await
    );

    assert!(outcome.is_success());
    assert_eq!(transport.sends(), 3);
    assert_eq!(daemon.reloads(), 2);
}

#[tokio::test]
async fn test_transport_errors_exhaust_attempts() {
    let transport = FakeTransport::always(Reply::Refused);
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let outcome = client
        .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(2))
        .await
        .unwrap();

    let failure = outcome.failure().expect("terminal failure");
    assert_eq!(failure.kind, FailureKind::Transport { timeout: false });
    assert_eq!(transport.sends(), 2);
    assert_eq!(daemon.reloads(), 1);
}

#[tokio::test]
async fn test_attempts_are_bounded() {
    for n in 1..=5 {
        let transport = FakeTransport::always(Reply::Status(503));
        let daemon = FakeDaemon::new();
        let mut client = client(&transport, &daemon).await;

        let outcome = client
            .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(n))
            .await
            .unwrap();

        assert_eq!(
            outcome.failure().map(|f| f.kind),
            Some(FailureKind::HttpStatus(503))
        );
        assert_eq!(transport.sends(), n as usize, "attempts for max_attempts={}", n);
        assert_eq!(daemon.reloads(), n as usize - 1, "rotations for max_attempts={}", n);
    }
}

#[tokio::test(start_paused = true)]
async fn test_immediate_success_skips_delay_and_rotation() {
    let transport = FakeTransport::always(Reply::Status(200));
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let policy = RetryPolicy::new(5, Duration::from_secs(30));
    let start = tokio::time::Instant::now();
    let outcome = client
        .execute_with_retry(&RequestSpec::get("https://example.test"), &policy)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(transport.sends(), 1);
    assert_eq!(daemon.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_waits_retry_delay_between_attempts() {
    let transport = FakeTransport::script(vec![Reply::Timeout, Reply::Status(200)]);
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let policy = RetryPolicy::new(2, Duration::from_secs(5));
    let start = tokio::time::Instant::now();
    let outcome = client
        .execute_with_retry(&RequestSpec::get("https://example.test"), &policy)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(daemon.reloads(), 1);
}

#[tokio::test]
async fn test_rotation_failure_does_not_abort_retries() {
    let transport = FakeTransport::always(Reply::Timeout);
    let daemon = FakeDaemon::failing_reload();
    let mut client = client(&transport, &daemon).await;

    let outcome = client
        .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(4))
        .await
        .unwrap();

    assert!(outcome.failure().unwrap().kind.is_timeout());
    assert_eq!(transport.sends(), 4);
    assert_eq!(daemon.reloads(), 3);
}

#[tokio::test]
async fn test_client_errors_can_skip_rotation() {
    let transport = FakeTransport::always(Reply::Status(404));
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let policy = no_delay(3).without_client_error_retry();
    let outcome = client
        .execute_with_retry(&RequestSpec::get("https://example.test/missing"), &policy)
        .await
        .unwrap();

    assert_eq!(
        outcome.failure().map(|f| f.kind),
        Some(FailureKind::HttpStatus(404))
    );
    assert_eq!(transport.sends(), 1);
    assert_eq!(daemon.reloads(), 0);

    // server errors are still retried under the same policy
    let transport = FakeTransport::script(vec![Reply::Status(500), Reply::Status(200)]);
    let daemon = FakeDaemon::new();
    let mut client = common::client(&transport, &daemon).await;
    let outcome = client
        .execute_with_retry(&RequestSpec::get("https://example.test"), &policy)
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(daemon.reloads(), 1);
}

#[tokio::test]
async fn test_client_errors_rotate_by_default() {
    let transport = FakeTransport::script(vec![Reply::Status(403), Reply::Status(200)]);
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let outcome = client
        .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(2))
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(daemon.reloads(), 1);
}

#[tokio::test]
async fn test_invalid_request_fails_before_network() {
    let transport = FakeTransport::always(Reply::Status(200));
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let spec = RequestSpec::post("https://example.test")
        .with_data("a=1")
        .with_json_value(serde_json::json!({"a": 1}));
    let err = assert_err!(client.execute_with_retry(&spec, &no_delay(3)).await);
    assert!(matches!(err, TorClientError::Config(_)));

    let err = assert_err!(
        client
            .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(0))
            .await
    );
    assert!(matches!(err, TorClientError::Config(_)));

    assert_eq!(transport.opened(), 0);
    assert_eq!(daemon.reloads(), 0);
}

#[tokio::test]
async fn test_invalid_session_header_is_not_retried() {
    let transport = FakeTransport::always(Reply::Status(200));
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let err = assert_err!(client.set_headers([("bad header", "x")]));
    assert!(matches!(err, TorClientError::Config(_)));
    assert!(client.session().headers().is_empty());

    let outcome = assert_ok!(
        client
            .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(3))
            .await
    );
    assert!(outcome.is_success());
    assert_eq!(transport.sends(), 1);
    assert_eq!(daemon.reloads(), 0);
}

#[tokio::test]
async fn test_unbuildable_request_fails_without_rotation() {
    let transport = FakeTransport::always(Reply::Unbuildable);
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let err = assert_err!(
        client
            .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(3))
            .await
    );
    assert!(matches!(err, TorClientError::Config(_)));
    assert_eq!(transport.sends(), 1);
    assert_eq!(transport.opened(), transport.released());
    assert_eq!(daemon.reloads(), 0);
    assert!(client.last_response().is_none());
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let transport = FakeTransport::new(|request, _| match request.url.path() {
        "/one" => Reply::Refused,
        "/two" => Reply::Status(200),
        _ => Reply::Status(404),
    });
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let urls = [
        "https://example.test/one",
        "https://example.test/two",
        "https://example.test/three",
    ];
    let results = client
        .batch_requests(urls, Method::Get, &no_delay(2))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    for (entry, url) in results.iter().zip(urls) {
        assert_eq!(entry.url, url);
    }

    assert_eq!(
        results[0].outcome.as_ref().unwrap().failure().map(|f| f.kind),
        Some(FailureKind::Transport { timeout: false })
    );
    assert!(results[1].response().is_some());
    assert_eq!(
        results[2].outcome.as_ref().unwrap().failure().map(|f| f.kind),
        Some(FailureKind::HttpStatus(404))
    );
    // one rotation each for /one and /three
    assert_eq!(daemon.reloads(), 2);
}

#[tokio::test]
async fn test_batch_keeps_going_after_bad_entry() {
    let transport = FakeTransport::always(Reply::Status(200));
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let results = client
        .batch_requests(
            ["not a url", "https://example.test/ok"],
            Method::Get,
            &no_delay(1),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(matches!(results[0].outcome, Err(TorClientError::Config(_))));
    assert!(results[0].response().is_none());
    assert!(results[1].response().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_retry_delay() {
    let transport = FakeTransport::always(Reply::Status(500));
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;

    let token = client.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    let policy = RetryPolicy::new(5, Duration::from_secs(10));
    let outcome = client
        .execute_with_retry(&RequestSpec::get("https://example.test"), &policy)
        .await
        .unwrap();

    assert_eq!(outcome, RequestOutcome::Cancelled);
    assert_eq!(transport.sends(), 1);
    assert_eq!(daemon.reloads(), 0);
}

#[tokio::test]
async fn test_cancelled_batch_marks_every_entry() {
    let transport = FakeTransport::always(Reply::Status(200));
    let daemon = FakeDaemon::new();
    let mut client = client(&transport, &daemon).await;
    client.cancellation_token().cancel();

    let results = client
        .batch_requests(
            ["https://a.test", "not a url", "https://b.test"],
            Method::Get,
            &no_delay(3),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(matches!(results[0].outcome, Ok(RequestOutcome::Cancelled)));
    assert!(matches!(results[1].outcome, Err(TorClientError::Config(_))));
    assert!(matches!(results[2].outcome, Ok(RequestOutcome::Cancelled)));
    assert_eq!(transport.opened(), 0);
}

#[tokio::test]
async fn test_debug_mode_reports_ip_after_rotation() {
    let transport = FakeTransport::new(|request, _| {
        if request.url.host_str() == Some("httpbin.org") {
            Reply::Json(serde_json::json!({"origin": "198.51.100.7"}))
        } else {
            Reply::Status(503)
        }
    });
    let daemon = FakeDaemon::new();
    let config = Config::default().with_debug(true).without_autostart();
    let mut client = client_with(config, &transport, &daemon).await;

    client
        .execute_with_retry(&RequestSpec::get("https://example.test"), &no_delay(2))
        .await
        .unwrap();

    let hosts: Vec<String> = transport
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.url.host_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(hosts, ["example.test", "httpbin.org", "example.test"]);
    // the IP lookup does not replace the request's response
    assert_eq!(client.last_response().map(|r| r.status), Some(503));
}
