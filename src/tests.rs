use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use http::{Method, StatusCode};
use serde_json::json;

use crate::agents::CustomAgent;
use crate::client::Client;
use crate::decode::{DecodeMode, ResponseData};
use crate::dispatcher::{Dispatcher, MockDispatcher, MockReply};
use crate::error::{HttpieError, HttpieErrorCode};
use crate::extensions::ManualClock;
use crate::policies::{HttpStatusPolicy, http_status};
use crate::request::RequestOptions;
use crate::retry::{RetryError, RetryOptions, retry_with_policy};

fn gzip(payload: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

fn windev_client() -> (Client, Arc<MockDispatcher>) {
    let mock = Arc::new(MockDispatcher::new());
    let dispatcher: Arc<dyn Dispatcher> = mock.clone();
    let client = Client::builder()
        .agent(
            CustomAgent::new("windev", "https://ws.dev.example.com", dispatcher)
                .expect("agent origin should parse"),
        )
        .build();
    (client, mock)
}

fn fast_retries(retries: u32) -> RetryOptions {
    RetryOptions::new()
        .retries(retries)
        .factor(1.0)
        .min_timeout(Duration::from_millis(5))
}

#[tokio::test(start_paused = true)]
async fn gzip_json_flows_through_agent_and_decoder() {
    let (client, mock) = windev_client();
    mock.intercept(
        Method::GET,
        "/ws_monitoring",
        MockReply::new(StatusCode::OK)
            .header("content-type", "application/json; charset=utf-8")
            .header("content-encoding", "gzip")
            .body(gzip(br#"{"uptime":42}"#)),
    );

    let response = client
        .get("/windev/ws_monitoring", RequestOptions::new())
        .await
        .expect("request should succeed");

    assert_eq!(response.data().as_json(), Some(&json!({"uptime": 42})));
    let recorded = mock.requests();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0].url.as_str(),
        "https://ws.dev.example.com/ws_monitoring"
    );
}

#[tokio::test(start_paused = true)]
async fn raw_mode_keeps_compressed_bytes() {
    let (client, mock) = windev_client();
    let compressed = gzip(b"hello");
    mock.intercept(
        Method::GET,
        "/blob",
        MockReply::new(StatusCode::OK)
            .header("content-encoding", "gzip")
            .body(compressed.clone()),
    );

    let response = client
        .get("/windev/blob", RequestOptions::new().mode(DecodeMode::Raw))
        .await
        .expect("request should succeed");

    match response.data() {
        ResponseData::Bytes(bytes) => assert_eq!(bytes.to_vec(), compressed),
        other => panic!("unexpected data: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn http_status_policy_retries_server_errors_until_success() {
    let (client, mock) = windev_client();
    mock.intercept(Method::GET, "/flaky", MockReply::new(StatusCode::SERVICE_UNAVAILABLE));
    mock.intercept(Method::GET, "/flaky", MockReply::new(StatusCode::BAD_GATEWAY));
    mock.intercept(
        Method::GET,
        "/flaky",
        MockReply::new(StatusCode::OK)
            .header("content-type", "text/plain")
            .body("up"),
    );

    let retried = retry_with_policy(
        |_| client.get("/windev/flaky", RequestOptions::new()),
        &fast_retries(5),
        &http_status(),
    )
    .await
    .expect("third attempt should be accepted");

    assert_eq!(retried.metrics.attempt, 2);
    assert_eq!(retried.data.data().as_text(), Some("up"));
    assert_eq!(mock.pending_interceptors(), 0);
}

#[tokio::test(start_paused = true)]
async fn http_status_policy_rejects_non_retryable_status_immediately() {
    let (client, mock) = windev_client();
    mock.intercept_persistent(Method::GET, "/missing", MockReply::new(StatusCode::NOT_IMPLEMENTED));

    let error = retry_with_policy(
        |_| client.get("/windev/missing", RequestOptions::new()),
        &fast_retries(5),
        &http_status(),
    )
    .await
    .expect_err("501 is not retryable by default");

    assert_eq!(error.to_string(), "Not Implemented");
    let error = error.into_operation_error().expect("operation error");
    assert_eq!(error.code(), HttpieErrorCode::OnHttpError);
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_status_set_retries_until_budget_is_spent() {
    let (client, mock) = windev_client();
    mock.intercept_persistent(Method::GET, "/missing", MockReply::new(StatusCode::NOT_IMPLEMENTED));

    let error = retry_with_policy(
        |_| client.get("/windev/missing", RequestOptions::new()),
        &fast_retries(2),
        &HttpStatusPolicy::new([501], true),
    )
    .await
    .expect_err("budget should run out");

    assert!(matches!(error, RetryError::RetriesExceeded { attempts: 2 }));
    assert_eq!(
        error.to_string(),
        "Exceeded the maximum number of allowed retries!"
    );
    assert_eq!(mock.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unthrown_http_error_is_classified_by_status() {
    let (client, mock) = windev_client();
    mock.intercept(Method::GET, "/soft", MockReply::new(StatusCode::INTERNAL_SERVER_ERROR));
    mock.intercept(Method::GET, "/soft", MockReply::new(StatusCode::NO_CONTENT));

    let retried = retry_with_policy(
        |_| {
            client.get(
                "/windev/soft",
                RequestOptions::new().throw_on_http_error(false),
            )
        },
        &fast_retries(3),
        &http_status(),
    )
    .await
    .expect("second attempt should be accepted");

    assert_eq!(retried.metrics.attempt, 1);
    assert_eq!(retried.data.status_code(), StatusCode::NO_CONTENT);
}

#[tokio::test(start_paused = true)]
async fn resolution_is_cached_per_method_until_ttl() {
    let clock = Arc::new(ManualClock::new());
    let mock = Arc::new(MockDispatcher::new());
    let dispatcher: Arc<dyn Dispatcher> = mock.clone();
    let client = Client::builder()
        .clock(clock.clone())
        .resolution_cache(8, Duration::from_secs(60))
        .agent(
            CustomAgent::new("windev", "https://ws.dev.example.com", dispatcher)
                .expect("agent origin should parse"),
        )
        .build();
    mock.intercept_persistent(Method::GET, "/ping", MockReply::new(StatusCode::OK));
    mock.intercept_persistent(Method::POST, "/ping", MockReply::new(StatusCode::OK));

    client
        .get("/windev/ping", RequestOptions::new())
        .await
        .expect("get should succeed");
    client
        .post("/windev/ping", RequestOptions::new())
        .await
        .expect("post should succeed");
    assert_eq!(client.resolver().cache().len(), 2);

    clock.advance(Duration::from_secs(61));
    assert!(!client.resolver().cache().contains("GET/windev/ping"));
}

#[tokio::test(start_paused = true)]
async fn body_failure_surfaces_as_fetch_body_error() {
    let (client, mock) = windev_client();
    mock.intercept(
        Method::GET,
        "/broken",
        MockReply::new(StatusCode::OK).body_error("connection reset"),
    );

    let error = client
        .get("/windev/broken", RequestOptions::new())
        .await
        .expect_err("body read should fail");

    assert_eq!(error.code(), HttpieErrorCode::FetchBody);
    assert!(matches!(error, HttpieError::FetchBody { .. }));
}
